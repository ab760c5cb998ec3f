//! Controller delivery of activated recipes

use async_trait::async_trait;
use errors::VulcanResult;
use tracing::info;

use crate::types::Recipe;

/// Pushes an activated recipe's parameters to the controller
#[async_trait]
pub trait RecipeDelivery: Send + Sync + 'static {
    async fn deliver(&self, recipe: &Recipe) -> VulcanResult<()>;
}

/// Logs the frozen parameters; the press has no recipe registers mapped yet
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingDelivery;

#[async_trait]
impl RecipeDelivery for LoggingDelivery {
    async fn deliver(&self, recipe: &Recipe) -> VulcanResult<()> {
        info!(
            "Recipe {} ({}) ready for controller: {}",
            recipe.id,
            recipe.params.name,
            recipe.params.activation_snapshot()
        );
        Ok(())
    }
}
