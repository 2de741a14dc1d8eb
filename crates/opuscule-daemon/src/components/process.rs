//! Operai that play by running an external pipeline and stop by killing it.

use std::process::Stdio;

use async_trait::async_trait;
use opuscule_proto::metadata::Metadata;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::playback::{Capabilities, Playable, PlayModes};

/// Each stage's stdout feeds the next stage's stdin.
pub struct ProcessOpus {
    record: Metadata,
    stages: Vec<Vec<String>>,
    running: Mutex<Vec<Child>>,
}

impl ProcessOpus {
    pub fn new(record: Metadata, stages: Vec<Vec<String>>) -> Self {
        Self {
            record,
            stages,
            running: Mutex::new(Vec::new()),
        }
    }

    fn spawn_all(&self) -> anyhow::Result<Vec<Child>> {
        let mut children: Vec<Child> = Vec::with_capacity(self.stages.len());
        for (i, stage) in self.stages.iter().enumerate() {
            let (program, args) = stage
                .split_first()
                .ok_or_else(|| anyhow::anyhow!("empty command in pipeline"))?;
            let last = i + 1 == self.stages.len();

            let stdin = match children.last_mut().and_then(|prev| prev.stdout.take()) {
                Some(stdout) => stdout.try_into()?,
                None => Stdio::null(),
            };
            let child = Command::new(program)
                .args(args)
                .stdin(stdin)
                .stdout(if last { Stdio::null() } else { Stdio::piped() })
                .stderr(Stdio::null())
                .kill_on_drop(true)
                .spawn()
                .map_err(|e| anyhow::anyhow!("failed to start {}: {}", program, e))?;
            debug!("Started {} (pid {:?})", program, child.id());
            children.push(child);
        }
        Ok(children)
    }

    async fn kill_all(children: &mut Vec<Child>) {
        for mut child in children.drain(..) {
            if let Err(e) = child.kill().await {
                debug!("kill: {}", e);
            }
        }
    }

    #[cfg(test)]
    pub async fn is_running(&self) -> bool {
        let mut running = self.running.lock().await;
        running
            .iter_mut()
            .any(|child| matches!(child.try_wait(), Ok(None)))
    }
}

#[async_trait]
impl Playable for ProcessOpus {
    fn capabilities(&self) -> Capabilities {
        Capabilities::default()
    }

    fn metadata(&self) -> Metadata {
        self.record.clone()
    }

    async fn play(&self, _modes: PlayModes) -> anyhow::Result<()> {
        let mut running = self.running.lock().await;
        Self::kill_all(&mut running).await;
        *running = self.spawn_all()?;
        info!(
            "Pipeline started: {}",
            self.stages.iter().map(|s| s.join(" ")).collect::<Vec<_>>().join(" | ")
        );
        Ok(())
    }

    async fn stop(&self) -> anyhow::Result<()> {
        let mut running = self.running.lock().await;
        if !running.is_empty() {
            Self::kill_all(&mut running).await;
            info!("Pipeline stopped");
        }
        Ok(())
    }
}
