use chrono::Duration;
use uuid::Uuid;

/// Options de génération
#[derive(Debug, Clone)]
pub struct GenerateOptions {
    /// Identité inscrite dans le bail de génération du roster.
    pub lease_holder: String,
    pub lease_ttl: Duration,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            lease_holder: format!("generator-{}", Uuid::new_v4()),
            lease_ttl: Duration::minutes(5),
        }
    }
}
