pub mod credential;
pub mod secret;
pub mod validation;

pub use credential::{constant_time_eq, ApiKeyToken, Credential, CredentialError};
pub use secret::{generate_key_id, generate_secret, hash_secret, verify_secret, Secret, SecretHash};
pub use validation::ValidatedJson;
