//! Domain models for board-auth.
//!
//! Rows map one-to-one onto the tables in `migrations/`; enums stored as text
//! columns decode through their `FromStr` impls so unknown values fail the read.

/// Implements sqlx text encoding/decoding for an enum exposing `as_str()` and
/// a fallible `FromStr`.
macro_rules! text_column {
    ($ty:ty) => {
        impl sqlx::Type<sqlx::Postgres> for $ty {
            fn type_info() -> sqlx::postgres::PgTypeInfo {
                <&str as sqlx::Type<sqlx::Postgres>>::type_info()
            }

            fn compatible(ty: &sqlx::postgres::PgTypeInfo) -> bool {
                <&str as sqlx::Type<sqlx::Postgres>>::compatible(ty)
            }
        }

        impl<'r> sqlx::Decode<'r, sqlx::Postgres> for $ty {
            fn decode(
                value: sqlx::postgres::PgValueRef<'r>,
            ) -> Result<Self, sqlx::error::BoxDynError> {
                let raw = <&str as sqlx::Decode<sqlx::Postgres>>::decode(value)?;
                Ok(raw.parse::<$ty>()?)
            }
        }

        impl sqlx::Encode<'_, sqlx::Postgres> for $ty {
            fn encode_by_ref(
                &self,
                buf: &mut sqlx::postgres::PgArgumentBuffer,
            ) -> Result<sqlx::encode::IsNull, sqlx::error::BoxDynError> {
                <&str as sqlx::Encode<sqlx::Postgres>>::encode_by_ref(&self.as_str(), buf)
            }
        }
    };
}

pub mod access_token;
pub mod invitation;
pub mod membership;
pub mod notification;
pub mod organization;
pub mod password_reset;
pub mod role;
pub mod user;

pub use access_token::AccessToken;
pub use invitation::{Invitation, InvitationResponse, InvitationStatus};
pub use membership::{Membership, OrganizationMember};
pub use notification::{NotificationEvent, QueuedNotification};
pub use organization::{
    Organization, OrganizationContext, OrganizationDetails, OrganizationResponse, OwnerSummary,
};
pub use password_reset::PasswordResetRecord;
pub use role::{InvalidRole, Permission, Role, UserRole};
pub use user::{AuthenticatedUser, User, UserResponse};
