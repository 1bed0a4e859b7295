//! Binds §4.10's two endpoint forms to a common accept surface. The
//! accepted halves are boxed into trait objects so the connection
//! handler doesn't need to be generic over `UnixStream`/`TcpStream`.

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, UnixListener};

use crate::endpoint::Endpoint;
use crate::error::{DaemonError, DaemonResult};

pub type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

pub enum Listener {
    Unix(UnixListener),
    Tcp(TcpListener),
}

impl Listener {
    pub async fn bind(endpoint: &Endpoint) -> DaemonResult<Self> {
        match endpoint {
            Endpoint::Unix(path) => {
                let listener = UnixListener::bind(path).map_err(|source| DaemonError::Bind {
                    endpoint: path.clone(),
                    source,
                })?;
                #[cfg(unix)]
                {
                    use std::os::unix::fs::PermissionsExt;
                    let _ = std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600));
                }
                Ok(Listener::Unix(listener))
            }
            Endpoint::Tcp { host, port } => {
                let addr = format!("{host}:{port}");
                let listener =
                    TcpListener::bind(&addr)
                        .await
                        .map_err(|source| DaemonError::Bind { endpoint: addr, source })?;
                Ok(Listener::Tcp(listener))
            }
        }
    }

    /// The endpoint actually bound, with a `port: 0` request resolved to
    /// the OS-assigned port.
    pub fn resolved_endpoint(&self, requested: &Endpoint) -> std::io::Result<Endpoint> {
        match (self, requested) {
            (Listener::Tcp(listener), Endpoint::Tcp { host, .. }) => {
                let addr = listener.local_addr()?;
                Ok(Endpoint::Tcp {
                    host: host.clone(),
                    port: addr.port(),
                })
            }
            _ => Ok(requested.clone()),
        }
    }

    pub async fn accept(&self) -> std::io::Result<(BoxedReader, BoxedWriter, String)> {
        match self {
            Listener::Unix(listener) => {
                let (stream, _addr) = listener.accept().await?;
                let (read_half, write_half) = tokio::io::split(stream);
                Ok((Box::new(read_half), Box::new(write_half), "unix-peer".to_string()))
            }
            Listener::Tcp(listener) => {
                let (stream, addr) = listener.accept().await?;
                let (read_half, write_half) = tokio::io::split(stream);
                Ok((Box::new(read_half), Box::new(write_half), addr.to_string()))
            }
        }
    }
}
