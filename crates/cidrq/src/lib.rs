//! Client for the CIDR lookup protocol.
//!
//! cidrq asks a remote lookup service whether IPv4 addresses fall inside its
//! managed CIDR ranges, over a long-lived TCP connection.
//!
//! # Crate Structure
//!
//! - [`transport`]: TCP endpoint resolution and connect
//! - [`frame`]: Records that keep message boundaries on the byte stream
//! - [`proto`]: IPv4 text codec and the binary message codec
//! - [`session`]: Connection lifecycle, lookup queue, and the blocking
//!   client (behind `session` feature)

/// Re-export transport types.
pub mod transport {
    pub use cidrq_transport::*;
}

/// Re-export record framing types.
pub mod frame {
    pub use cidrq_frame::*;
}

/// Re-export protocol types.
pub mod proto {
    pub use cidrq_proto::*;
}

/// Re-export session types (requires `session` feature).
#[cfg(feature = "session")]
pub mod session {
    pub use cidrq_session::*;
}
