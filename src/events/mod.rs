//! # Events Module
//!
//! Progress reporting for the service and pipeline.
//!
//! ## Design
//! The core library emits events through channels, so a CLI spinner, a
//! web layer or a test can follow a request without the core knowing
//! which one it is talking to.
//!
//! ## Example
//! ```rust,ignore
//! let (sender, receiver) = EventChannel::new();
//!
//! std::thread::spawn(move || {
//!     for event in receiver.iter() {
//!         if let Event::Pipeline(PipelineEvent::StageStarted { stage }) = event {
//!             println!("{stage}...");
//!         }
//!     }
//! });
//!
//! service.handle_upload_with_events(upload, &sender)?;
//! ```

mod channel;
mod types;

pub use channel::{null_sender, EventChannel, EventReceiver, EventSender};
pub use types::*;
