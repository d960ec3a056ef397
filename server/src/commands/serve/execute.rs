use std::error::Error;

use serde::Serialize;

use super::ServeCmd;
use crate::commands::Execute;
use crate::config::{Configuration, keys};
use crate::lifecycle::{Collaborators, LifecycleController, shutdown_signal};
use crate::output::Outputable;

/// Summary of a finished `serve` run.
#[derive(Debug, Serialize)]
pub struct ServeResult {
    /// Address the listener was bound to
    pub address: String,
    pub state: String,
}

impl ServeCmd {
    /// Apply command-line overrides on top of the environment.
    pub fn apply(&self, config: Configuration) -> Configuration {
        match self.port {
            Some(port) => config.with(keys::PORT, port.to_string()),
            None => config,
        }
    }
}

impl Execute for ServeCmd {
    type Output = ServeResult;

    async fn execute(self, config: Configuration) -> Result<Self::Output, Box<dyn Error>> {
        let config = self.apply(config);
        let controller = LifecycleController::new(config, Collaborators::production()?);

        let address = controller.start().await?;
        controller.run_until_shutdown(shutdown_signal()).await;

        Ok(ServeResult {
            address: address.to_string(),
            state: format!("{:?}", controller.state()),
        })
    }
}

impl Outputable for ServeResult {
    fn to_text(&self) -> String {
        format!("Server on {}: {}", self.address, self.state.to_lowercase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn test_serve_result_text() {
        let result = ServeResult {
            address: "127.0.0.1:4000".to_string(),
            state: "Stopped".to_string(),
        };
        assert_eq!(result.to_text(), "Server on 127.0.0.1:4000: stopped");
    }
}
