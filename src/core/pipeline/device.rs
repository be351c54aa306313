//! Execution device selection and working-memory accounting.
//!
//! The pipeline picks a device once, when it is built, and keeps it for
//! its whole lifetime:
//! - **Accelerated** - a multi-threaded rayon pool with a working-memory
//!   budget and a reusable buffer pool
//! - **Cpu** - a single-threaded fallback with no budget
//!
//! Both produce bit-identical results: every stage splits work by output
//! row and never reduces floats across threads.

use crate::error::PipelineError;
use rayon::{ThreadPool, ThreadPoolBuilder};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;

/// Default working-memory budget for the accelerated device (1 GiB)
pub const DEFAULT_MEMORY_BUDGET: u64 = 1024 * 1024 * 1024;

/// Buffers kept for reuse between requests
const MAX_POOLED_BUFFERS: usize = 4;

/// Which device the caller wants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DeviceChoice {
    /// Accelerated when more than one core is available, otherwise Cpu
    #[default]
    Auto,
    /// Force the accelerated device
    Accelerated,
    /// Force the single-threaded fallback
    Cpu,
}

/// The device actually selected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionDevice {
    Accelerated { threads: usize, memory_budget: u64 },
    Cpu,
}

impl ExecutionDevice {
    /// Resolve a choice against the current machine
    pub fn select(choice: DeviceChoice, memory_budget: u64) -> Self {
        let cores = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);

        match choice {
            DeviceChoice::Cpu => ExecutionDevice::Cpu,
            DeviceChoice::Auto if cores <= 1 => ExecutionDevice::Cpu,
            DeviceChoice::Auto | DeviceChoice::Accelerated => ExecutionDevice::Accelerated {
                threads: cores.max(2),
                memory_budget,
            },
        }
    }
}

impl std::fmt::Display for ExecutionDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecutionDevice::Accelerated { threads, .. } => {
                write!(f, "accelerated ({} threads)", threads)
            }
            ExecutionDevice::Cpu => write!(f, "cpu"),
        }
    }
}

/// A selected device with its thread pool and buffer pool
pub struct Device {
    kind: ExecutionDevice,
    pool: ThreadPool,
    buffers: Mutex<Vec<Vec<f64>>>,
}

impl Device {
    /// Build the thread pool for a selected device
    pub fn new(kind: ExecutionDevice) -> Result<Self, PipelineError> {
        let threads = match kind {
            ExecutionDevice::Accelerated { threads, .. } => threads,
            ExecutionDevice::Cpu => 1,
        };

        let pool = ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("denoise-{}", i))
            .build()
            .map_err(|e| PipelineError::Failed {
                stage: "device",
                reason: e.to_string(),
            })?;

        Ok(Self {
            kind,
            pool,
            buffers: Mutex::new(Vec::new()),
        })
    }

    /// The selected device
    pub fn kind(&self) -> ExecutionDevice {
        self.kind
    }

    /// Run `op` on this device's threads
    pub fn install<R: Send>(&self, op: impl FnOnce() -> R + Send) -> R {
        self.pool.install(op)
    }

    /// Fail early when a job cannot fit in the device budget
    pub fn ensure_fits(&self, requested: u64) -> Result<(), PipelineError> {
        if let ExecutionDevice::Accelerated { memory_budget, .. } = self.kind {
            if requested > memory_budget {
                return Err(self.out_of_memory(requested));
            }
        }
        Ok(())
    }

    /// Get a zeroed buffer of `len` floats, reusing a pooled one if possible
    pub fn alloc(&self, len: usize) -> Result<Vec<f64>, PipelineError> {
        let pooled = self.buffers.lock().ok().and_then(|mut buffers| {
            let index = buffers.iter().position(|b| b.capacity() >= len)?;
            Some(buffers.swap_remove(index))
        });

        let mut buffer = match pooled {
            Some(buffer) => buffer,
            None => {
                let mut buffer = Vec::new();
                if buffer.try_reserve_exact(len).is_err() {
                    let requested = (len * std::mem::size_of::<f64>()) as u64;
                    return Err(match self.kind {
                        ExecutionDevice::Accelerated { .. } => self.out_of_memory(requested),
                        ExecutionDevice::Cpu => PipelineError::Failed {
                            stage: "alloc",
                            reason: format!("could not allocate {} bytes", requested),
                        },
                    });
                }
                buffer
            }
        };

        buffer.clear();
        buffer.resize(len, 0.0);
        Ok(buffer)
    }

    /// Hand a buffer back for reuse
    pub fn recycle(&self, buffer: Vec<f64>) {
        if let Ok(mut buffers) = self.buffers.lock() {
            if buffers.len() < MAX_POOLED_BUFFERS {
                buffers.push(buffer);
            }
        }
    }

    /// Drop every pooled buffer
    pub fn release_pool(&self) {
        if let Ok(mut buffers) = self.buffers.lock() {
            buffers.clear();
            buffers.shrink_to_fit();
        }
    }

    /// Bytes currently held by the buffer pool
    pub fn pooled_bytes(&self) -> u64 {
        self.buffers
            .lock()
            .map(|buffers| {
                buffers
                    .iter()
                    .map(|b| (b.capacity() * std::mem::size_of::<f64>()) as u64)
                    .sum()
            })
            .unwrap_or(0)
    }

    /// Clears the pool before reporting, so the caller gets memory back
    fn out_of_memory(&self, requested: u64) -> PipelineError {
        self.release_pool();
        let budget = match self.kind {
            ExecutionDevice::Accelerated { memory_budget, .. } => memory_budget,
            ExecutionDevice::Cpu => 0,
        };
        PipelineError::OutOfDeviceMemory { requested, budget }
    }
}
