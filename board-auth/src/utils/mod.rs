pub mod password;
pub mod token;
pub mod validation;

pub use password::{
    check_password_strength, hash_password, verify_password, Password, PasswordHashString,
};
pub use token::{generate_token, hash_token, token_matches_hash};
pub use validation::{is_valid_email, ValidatedJson};
