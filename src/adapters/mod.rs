//! Concrete [`Transport`](crate::transport::Transport) implementations.

#[cfg(unix)]
pub mod unix_socket;

#[cfg(unix)]
pub use unix_socket::UnixSocketTransport;
