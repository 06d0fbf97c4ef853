use std::error::Error;

use crate::chunk::Chunk;

/// One post-generation decoration pass.
pub trait Populator: Send + Sync {
    fn name(&self) -> &str;
    fn populate(&self, chunk: &Chunk) -> Result<(), Box<dyn Error + Send + Sync>>;
}
