use crate::node::NodeId;

/// Prefix marking ids that only exist on the client.
pub const TEMP_ID_PREFIX: &str = "tmp-";

/// Sequential generator for client-temporary node ids
#[derive(Debug, Clone)]
pub struct IdGenerator {
    seed: String, // Editor session seed
    count: u64,   // Sequential counter
}

impl IdGenerator {
    pub fn new(seed: impl Into<String>) -> Self {
        Self {
            seed: seed.into(),
            count: 0,
        }
    }

    /// Generate next temporary ID
    pub fn new_id(&mut self) -> NodeId {
        self.count += 1;
        NodeId::new(format!("{}{}-{}", TEMP_ID_PREFIX, self.seed, self.count))
    }

    pub fn seed(&self) -> &str {
        &self.seed
    }
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::new("local")
    }
}
