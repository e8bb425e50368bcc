use tokio::runtime::Handle;

use crate::config::AppConfig;
use crate::tools::ToolPaths;

/// Created once at startup and handed to everything that needs settings,
/// helper binaries or the runtime; dropped when the app exits.
#[derive(Debug, Clone)]
pub struct AppContext {
    pub config: AppConfig,
    pub tools: ToolPaths,
    pub runtime: Handle,
}

impl AppContext {
    pub fn new(config: AppConfig, runtime: Handle) -> Self {
        let tools = ToolPaths::resolve(&config);
        Self {
            config,
            tools,
            runtime,
        }
    }
}
