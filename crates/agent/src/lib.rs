//! The turnrelay chat pipeline.
//!
//! One invocation:
//!
//! 1. **Load** the session's recent turns (failure → empty history)
//! 2. **Assemble** history plus the new message, optionally context-prefixed
//! 3. **Invoke** the model once with the active policy as system prompt
//! 4. **Extract** the escalation marker from the reply
//! 5. **Record** the user turn, the assistant turn, and a decision record
//!
//! Only step 3 can fail the invocation.

pub mod assembler;
pub mod pipeline;
pub mod recorder;
pub mod signal;

pub use assembler::{AssemblyInput, assemble};
pub use pipeline::{ChatInput, ChatOutcome, ChatPipeline, Stage};
pub use recorder::{Exchange, RecordReport, TurnRecorder};
pub use signal::{ExtractedReply, extract_escalation};
