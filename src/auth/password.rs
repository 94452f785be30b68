use crate::error::AppError;

/// One-way salted hash of a plaintext password, fixed cost factor.
pub fn hash_password(plain: &str) -> Result<String, AppError> {
    Ok(bcrypt::hash(plain, bcrypt::DEFAULT_COST)?)
}

/// Verify a plaintext password against a stored bcrypt hash. A malformed
/// hash counts as a failed match rather than an error.
pub fn verify_password(plain: &str, hash: &str) -> bool {
    bcrypt::verify(plain, hash).unwrap_or(false)
}
