//! System: appliance-level commands.

use async_trait::async_trait;
use opuscule_proto::protocol::Labels;

use super::Component;
use crate::menu::{Blueprint, CommandAction};

pub const TAG: &str = "system";

pub struct System;

fn notice(name: &str, short_name: &str, comment: &str) -> Blueprint {
    Blueprint::command(
        Labels::new(name, short_name, comment),
        CommandAction::Notice(format!("System command: {}", comment)),
    )
}

#[async_trait]
impl Component for System {
    fn tag(&self) -> &'static str {
        TAG
    }

    fn labels(&self) -> Labels {
        Labels::new("System", "Sys", "System Commands")
    }

    fn build(&self) -> Vec<Blueprint> {
        vec![
            notice("Logs", "Log", "Display the logs."),
            notice("Sleep", "Slp", "Put the system to sleep."),
            notice("Restart", "Rst", "Restart the system."),
            Blueprint::command(
                Labels::new("Shutdown", "Stdn", "Shutdown the system."),
                CommandAction::Shutdown,
            ),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_commands() {
        assert!(System.requirements_met().await);
        assert!(!System.has_favorites());
        let commands = System.build();
        let names: Vec<&str> = commands.iter().map(|c| c.labels().name.as_str()).collect();
        assert_eq!(names, vec!["Logs", "Sleep", "Restart", "Shutdown"]);
        assert!(matches!(
            &commands[3],
            Blueprint::Command {
                action: CommandAction::Shutdown,
                ..
            }
        ));
    }
}
