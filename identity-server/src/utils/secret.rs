use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use rand::Rng;

const SECRET_BYTES: usize = 32;
const KEY_ID_BYTES: usize = 18;

/// Newtype for bearer secrets so they never end up in logs.
#[derive(Clone)]
pub struct Secret(String);

impl Secret {
    pub fn new(secret: String) -> Self {
        Self(secret)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Secret(***)")
    }
}

/// Newtype for an argon2 PHC string.
#[derive(Debug, Clone)]
pub struct SecretHash(String);

impl SecretHash {
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

/// URL-safe base64 (no padding) of `size` random bytes. The alphabet never
/// contains `.`, so the output is safe inside a `kind.id.secret` bearer.
pub fn generate_random_encoded_bytes(size: usize) -> String {
    let mut rng = rand::thread_rng();
    let mut bytes = vec![0u8; size];
    rng.fill(&mut bytes[..]);
    URL_SAFE_NO_PAD.encode(bytes)
}

pub fn generate_secret() -> Secret {
    Secret::new(generate_random_encoded_bytes(SECRET_BYTES))
}

pub fn generate_key_id() -> String {
    generate_random_encoded_bytes(KEY_ID_BYTES)
}

/// Hash a secret using Argon2id with a random salt embedded in the output.
pub fn hash_secret(secret: &Secret) -> Result<SecretHash, anyhow::Error> {
    let argon2 = Argon2::default();
    let salt = SaltString::generate(&mut OsRng);

    let hash = argon2
        .hash_password(secret.as_str().as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("Failed to hash secret: {}", e))?
        .to_string();

    Ok(SecretHash::new(hash))
}

/// Verify a secret against its hash. The argon2 verifier compares digests
/// in constant time.
pub fn verify_secret(secret: &Secret, hash: &SecretHash) -> Result<(), anyhow::Error> {
    let parsed_hash = PasswordHash::new(hash.as_str())
        .map_err(|e| anyhow::anyhow!("Invalid secret hash format: {}", e))?;

    Argon2::default()
        .verify_password(secret.as_str().as_bytes(), &parsed_hash)
        .map_err(|_| anyhow::anyhow!("Secret verification failed"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_and_verify() {
        let secret = generate_secret();
        let hash = hash_secret(&secret).expect("Failed to hash secret");

        assert!(hash.as_str().starts_with("$argon2"));
        assert!(verify_secret(&secret, &hash).is_ok());
        assert!(verify_secret(&Secret::new("wrong".to_string()), &hash).is_err());
    }

    #[test]
    fn test_same_secret_different_hashes() {
        let secret = Secret::new("same-secret".to_string());
        let hash1 = hash_secret(&secret).expect("Failed to hash secret");
        let hash2 = hash_secret(&secret).expect("Failed to hash secret");

        assert_ne!(hash1.as_str(), hash2.as_str());
        assert!(verify_secret(&secret, &hash1).is_ok());
        assert!(verify_secret(&secret, &hash2).is_ok());
    }

    #[test]
    fn test_generated_material_has_no_separator() {
        for _ in 0..32 {
            assert!(!generate_secret().as_str().contains('.'));
            assert!(!generate_key_id().contains('.'));
        }
        assert_eq!(generate_key_id().len(), 24);
        assert_eq!(generate_secret().as_str().len(), 43);
    }

    #[test]
    fn test_debug_redacts() {
        let secret = Secret::new("super-secret".to_string());
        assert_eq!(format!("{:?}", secret), "Secret(***)");
    }

    #[test]
    fn test_garbage_hash_is_rejected() {
        let secret = Secret::new("x".to_string());
        assert!(verify_secret(&secret, &SecretHash::new("not-a-hash".to_string())).is_err());
    }
}
