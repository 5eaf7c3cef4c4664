//! Actions: protocol envelopes, wire codec and the router.
//!
//! ```text
//! frame ──▶ codec::parse_request ──▶ ActionMux::dispatch ──▶ handler
//!                                                              │
//! frame ◀── codec::encode_response ◀──── Response<Value> ◀─────┘
//! ```

pub mod codec;
pub mod names;
mod protocol;
mod router;

pub use names::ActionName;
pub use protocol::{RawRequest, RawResponse, Request, Response, RetCode, RetCodeBand, Status};
pub use router::{ActionHandler, ActionMux, ErasedAction, TypedAction};
