use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};

/// Special characters accepted by the strength rule.
pub const PASSWORD_SPECIAL_CHARS: &str = "@$!%*#?&";
pub const PASSWORD_MIN_LENGTH: usize = 8;

/// Newtype for password to prevent accidental logging
#[derive(Clone)]
pub struct Password(String);

impl Password {
    pub fn new(password: impl Into<String>) -> Self {
        Self(password.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for Password {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Password(***)")
    }
}

/// Newtype for password hash
#[derive(Debug, Clone)]
pub struct PasswordHashString(String);

impl PasswordHashString {
    pub fn new(hash: String) -> Self {
        Self(hash)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

/// Hash a password with Argon2id; the salt is generated and embedded in the
/// PHC string.
pub fn hash_password(password: &Password) -> Result<PasswordHashString, anyhow::Error> {
    let argon2 = Argon2::default();
    let salt = SaltString::generate(&mut OsRng);

    let password_hash = argon2
        .hash_password(password.as_str().as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("Failed to hash password: {}", e))?
        .to_string();

    Ok(PasswordHashString::new(password_hash))
}

/// Returns `false` for a wrong password and for an unparseable stored hash.
pub fn verify_password(password: &Password, password_hash: &PasswordHashString) -> bool {
    let Ok(parsed_hash) = PasswordHash::new(password_hash.as_str()) else {
        tracing::warn!("Stored password hash is not a valid PHC string");
        return false;
    };

    Argon2::default()
        .verify_password(password.as_str().as_bytes(), &parsed_hash)
        .is_ok()
}

/// Registration / reset strength rule: at least 8 characters with a
/// lowercase letter, an uppercase letter, a digit and one of `@$!%*#?&`.
pub fn check_password_strength(password: &str) -> Result<(), &'static str> {
    if password.chars().count() < PASSWORD_MIN_LENGTH {
        return Err("The password must be at least 8 characters.");
    }
    if !password.chars().any(|c| c.is_ascii_lowercase()) {
        return Err("The password must contain at least one lowercase letter.");
    }
    if !password.chars().any(|c| c.is_ascii_uppercase()) {
        return Err("The password must contain at least one uppercase letter.");
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        return Err("The password must contain at least one number.");
    }
    if !password.chars().any(|c| PASSWORD_SPECIAL_CHARS.contains(c)) {
        return Err("The password must contain at least one special character (@$!%*#?&).");
    }
    Ok(())
}
