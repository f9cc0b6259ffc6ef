//! Incremental vertex output.
//!
//! Each vertex that streams gets a bounded FIFO of [`StreamData`] records in
//! the run's [`StreamContext`]. Subscribers register per-vertex callbacks and
//! are invoked synchronously, in registration order, on every emission. A
//! shared context is unlocked while they run.

use crate::{EventEmitter, ExecutionEvent, Value, VertexId};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, PoisonError};

/// Records retained per vertex before the oldest is evicted.
pub const STREAM_BUFFER_CAPACITY: usize = 1000;

pub type StreamCallbackError = Box<dyn std::error::Error + Send + Sync>;

pub type StreamCallback = Arc<dyn Fn(&StreamData) -> Result<(), StreamCallbackError> + Send + Sync>;

/// Stream context shared by every vertex task of one run.
pub type SharedStream = Arc<Mutex<StreamContext>>;

/// Handle returned by [`StreamContext::register_stream_callback`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallbackId(u64);

/// One emission of a streaming vertex.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamData {
    pub data: Value,
    pub vertex_id: VertexId,
    /// Wall-clock seconds since the Unix epoch.
    pub timestamp: f64,
    pub is_final: bool,
    pub metadata: HashMap<String, Value>,
}

impl StreamData {
    fn now(
        vertex_id: VertexId,
        data: Value,
        is_final: bool,
        metadata: HashMap<String, Value>,
    ) -> Self {
        Self {
            data,
            vertex_id,
            timestamp: Utc::now().timestamp_micros() as f64 / 1_000_000.0,
            is_final,
            metadata,
        }
    }
}

pub struct StreamContext {
    capacity: usize,
    stream_buffers: HashMap<VertexId, VecDeque<StreamData>>,
    stream_callbacks: HashMap<VertexId, Vec<(CallbackId, StreamCallback)>>,
    final_outputs: HashMap<VertexId, Value>,
    next_callback: u64,
}

impl StreamContext {
    pub fn new() -> Self {
        Self::with_capacity(STREAM_BUFFER_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            stream_buffers: HashMap::new(),
            stream_callbacks: HashMap::new(),
            final_outputs: HashMap::new(),
            next_callback: 0,
        }
    }

    pub fn shared(self) -> SharedStream {
        Arc::new(Mutex::new(self))
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Subscribe to a vertex's emissions. Registrations are not deduplicated.
    pub fn register_stream_callback<F>(&mut self, vertex_id: impl Into<VertexId>, callback: F) -> CallbackId
    where
        F: Fn(&StreamData) -> Result<(), StreamCallbackError> + Send + Sync + 'static,
    {
        self.add_stream_callback(vertex_id, Arc::new(callback))
    }

    /// Like [`StreamContext::register_stream_callback`], for an already shared callback.
    pub fn add_stream_callback(&mut self, vertex_id: impl Into<VertexId>, callback: StreamCallback) -> CallbackId {
        let id = CallbackId(self.next_callback);
        self.next_callback += 1;
        self.stream_callbacks
            .entry(vertex_id.into())
            .or_default()
            .push((id, callback));
        id
    }

    /// Returns false when the callback was not registered for this vertex.
    pub fn unregister_stream_callback(&mut self, vertex_id: &str, id: CallbackId) -> bool {
        let Some(callbacks) = self.stream_callbacks.get_mut(vertex_id) else {
            return false;
        };
        let before = callbacks.len();
        callbacks.retain(|(registered, _)| *registered != id);
        let removed = callbacks.len() != before;
        if callbacks.is_empty() {
            self.stream_callbacks.remove(vertex_id);
        }
        removed
    }

    pub fn callback_count(&self, vertex_id: &str) -> usize {
        self.stream_callbacks.get(vertex_id).map_or(0, Vec::len)
    }

    /// Record an emission, notify subscribers and, when final, remember the value.
    ///
    /// Subscriber failures (errors or panics) are logged and never reach the emitter.
    pub fn emit_stream_data(
        &mut self,
        vertex_id: impl Into<VertexId>,
        data: Value,
        is_final: bool,
        metadata: Option<HashMap<String, Value>>,
    ) -> StreamData {
        let (record, callbacks) = self.record(vertex_id.into(), data, is_final, metadata);
        notify(&record, &callbacks);
        record
    }

    /// Buffer the emission and snapshot the vertex's subscribers without calling them.
    fn record(
        &mut self,
        vertex_id: VertexId,
        data: Value,
        is_final: bool,
        metadata: Option<HashMap<String, Value>>,
    ) -> (StreamData, Vec<(CallbackId, StreamCallback)>) {
        let record = StreamData::now(vertex_id.clone(), data, is_final, metadata.unwrap_or_default());

        let capacity = self.capacity;
        let buffer = self
            .stream_buffers
            .entry(vertex_id.clone())
            .or_insert_with(|| VecDeque::with_capacity(capacity.min(64)));
        if buffer.len() >= capacity {
            buffer.pop_front();
        }
        buffer.push_back(record.clone());

        if is_final {
            self.final_outputs.insert(vertex_id.clone(), record.data.clone());
        }

        let callbacks = self.stream_callbacks.get(&vertex_id).cloned().unwrap_or_default();
        (record, callbacks)
    }

    /// Buffered records, oldest first. Empty when the vertex never streamed.
    pub fn get_stream_buffer(&self, vertex_id: &str) -> Vec<StreamData> {
        self.stream_buffers
            .get(vertex_id)
            .map(|buffer| buffer.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn get_final_output(&self, vertex_id: &str) -> Option<Value> {
        self.final_outputs.get(vertex_id).cloned()
    }

    pub fn streamed_vertices(&self) -> Vec<VertexId> {
        self.stream_buffers.keys().cloned().collect()
    }
}

impl Default for StreamContext {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for StreamContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamContext")
            .field("capacity", &self.capacity)
            .field("buffers", &self.stream_buffers.len())
            .field("final_outputs", &self.final_outputs)
            .finish()
    }
}

fn notify(record: &StreamData, callbacks: &[(CallbackId, StreamCallback)]) {
    for (id, callback) in callbacks {
        match panic::catch_unwind(AssertUnwindSafe(|| callback(record))) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::warn!("Stream callback {:?} for vertex {} failed: {}", id, record.vertex_id, e);
            }
            Err(_) => {
                tracing::warn!("Stream callback {:?} for vertex {} panicked", id, record.vertex_id);
            }
        }
    }
}

/// A vertex's handle onto the run's stream context.
///
/// Emissions land in the [`StreamContext`] and are mirrored onto the
/// execution event bus when one is attached.
#[derive(Clone)]
pub struct StreamEmitter {
    vertex_id: VertexId,
    stream: SharedStream,
    events: Option<EventEmitter>,
}

impl StreamEmitter {
    pub fn new(vertex_id: impl Into<VertexId>, stream: SharedStream) -> Self {
        Self {
            vertex_id: vertex_id.into(),
            stream,
            events: None,
        }
    }

    pub fn with_events(mut self, events: EventEmitter) -> Self {
        self.events = Some(events);
        self
    }

    pub fn vertex_id(&self) -> &str {
        &self.vertex_id
    }

    pub fn emit(&self, data: Value, is_final: bool, metadata: Option<HashMap<String, Value>>) {
        let (record, callbacks) = self
            .stream
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .record(self.vertex_id.clone(), data, is_final, metadata);
        // Subscribers run outside the lock so they may emit on this context.
        notify(&record, &callbacks);

        if let Some(events) = &self.events {
            events.publish(ExecutionEvent::StreamChunk {
                execution_id: events.execution_id(),
                vertex_id: record.vertex_id,
                data: record.data,
                is_final: record.is_final,
                metadata: record.metadata,
                timestamp: Utc::now(),
            });
        }
    }

    pub fn chunk(&self, data: impl Into<Value>) {
        self.emit(data.into(), false, None);
    }

    pub fn finish(&self, data: impl Into<Value>) {
        self.emit(data.into(), true, None);
    }
}
