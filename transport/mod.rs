// Transport module: byte-stream connections (plain TCP or TLS) the client and server are built on
pub mod traits;
pub mod options;
pub mod tcp;
pub mod tls;

pub use traits::*;
pub use options::*;
pub use tcp::*;
pub use tls::*;
