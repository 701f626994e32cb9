use std::sync::Arc;

use ingest_common::record::Record;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{error, info};

use crate::error::GraphError;
use crate::stage::{StageRunner, Transform};

/// Reference to a named channel inside a graph under construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelHandle(usize);

struct ChannelSlot<R> {
    name: String,
    sender: mpsc::Sender<R>,
    receiver: Option<mpsc::Receiver<R>>,
}

struct StageSpec<R> {
    transform: Arc<dyn Transform<R>>,
    input: Option<ChannelHandle>,
    ok_out: Option<ChannelHandle>,
    degraded_out: Option<ChannelHandle>,
    width: usize,
}

/// Builder access to the stage added last; wires its input and outputs.
pub struct StageBuilder<'g, R: Record> {
    graph: &'g mut PipelineGraph<R>,
    index: usize,
}

impl<R: Record> StageBuilder<'_, R> {
    pub fn input(self, channel: ChannelHandle) -> Self {
        self.graph.stages[self.index].input = Some(channel);
        self
    }

    pub fn ok_output(self, channel: ChannelHandle) -> Self {
        self.graph.stages[self.index].ok_out = Some(channel);
        self
    }

    pub fn degraded_output(self, channel: ChannelHandle) -> Self {
        self.graph.stages[self.index].degraded_out = Some(channel);
        self
    }

    pub fn width(self, width: usize) -> Self {
        self.graph.stages[self.index].width = width;
        self
    }
}

/// A static graph of stages wired together with named channels, built once
/// at startup and never mutated afterwards. Channels mirror broker topics;
/// fan-out happens through a stage's Ok/Degraded output pair, fan-in by
/// pointing several stages at the same output channel.
pub struct PipelineGraph<R: Record> {
    name: String,
    channels: Vec<ChannelSlot<R>>,
    stages: Vec<StageSpec<R>>,
    capacity: usize,
}

impl<R: Record> PipelineGraph<R> {
    pub fn new(name: &str, capacity: usize) -> Self {
        Self {
            name: name.to_owned(),
            channels: Vec::new(),
            stages: Vec::new(),
            capacity: capacity.max(1),
        }
    }

    pub fn channel(&mut self, name: &str) -> ChannelHandle {
        let (sender, receiver) = mpsc::channel(self.capacity);
        self.channels.push(ChannelSlot {
            name: name.to_owned(),
            sender,
            receiver: Some(receiver),
        });
        ChannelHandle(self.channels.len() - 1)
    }

    /// A sender for feeding records into the graph from outside (the
    /// broker driver). Dropping every entry sender drains and shuts the
    /// graph down stage by stage.
    pub fn entry(&self, channel: ChannelHandle) -> mpsc::Sender<R> {
        self.channels[channel.0].sender.clone()
    }

    pub fn stage(&mut self, transform: Arc<dyn Transform<R>>) -> StageBuilder<'_, R> {
        self.stages.push(StageSpec {
            transform,
            input: None,
            ok_out: None,
            degraded_out: None,
            width: 1,
        });
        let index = self.stages.len() - 1;
        StageBuilder { graph: self, index }
    }

    /// Validate the wiring and spawn every stage worker. Consumes the
    /// graph; the graph's own channel senders are dropped here so that
    /// shutdown cascades from the entry senders alone.
    pub fn spawn(mut self) -> Result<PipelineHandle, GraphError> {
        if self.stages.is_empty() {
            return Err(GraphError::Empty);
        }

        let mut tasks = JoinSet::new();
        for spec in self.stages.drain(..) {
            let input = spec
                .input
                .ok_or_else(|| GraphError::MissingInput(spec.transform.name().to_owned()))?;
            let slot = &mut self.channels[input.0];
            let receiver = slot
                .receiver
                .take()
                .ok_or_else(|| GraphError::InputAlreadyClaimed(slot.name.clone()))?;

            let ok_out = spec.ok_out.map(|c| self.channels[c.0].sender.clone());
            let degraded_out = spec.degraded_out.map(|c| self.channels[c.0].sender.clone());

            StageRunner::new(spec.transform, receiver, ok_out, degraded_out, spec.width)
                .spawn(&mut tasks);
        }

        if let Some(slot) = self.channels.iter().find(|s| s.receiver.is_some()) {
            return Err(GraphError::UnconsumedChannel(slot.name.clone()));
        }

        info!("pipeline {} started with {} workers", self.name, tasks.len());
        Ok(PipelineHandle { name: self.name, tasks })
    }
}

/// Handle over a running graph. The graph finishes when its entry senders
/// are dropped and every in-flight record has reached a terminal state.
pub struct PipelineHandle {
    name: String,
    tasks: JoinSet<()>,
}

impl PipelineHandle {
    pub async fn join(mut self) {
        while let Some(result) = self.tasks.join_next().await {
            if let Err(err) = result {
                error!("pipeline {} worker panicked: {}", self.name, err);
            }
        }
        info!("pipeline {} drained", self.name);
    }
}
