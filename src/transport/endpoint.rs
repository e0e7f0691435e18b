use tokio_tungstenite::tungstenite::http::Uri;

use crate::error::ConnectError;

/// Path of the voice socket on the service host
pub const VOICE_PATH: &str = "/ws/voice";

/// Derive the voice socket URL from the origin of the hosting page.
///
/// The socket scheme mirrors the page: `http` becomes `ws`, `https`
/// becomes `wss`. Origins that already use a socket scheme keep it.
pub fn voice_endpoint(origin: &str) -> Result<String, ConnectError> {
    let uri: Uri = origin
        .trim()
        .parse()
        .map_err(|e| ConnectError::InvalidEndpoint(format!("{}: {}", origin, e)))?;

    let scheme = match uri.scheme_str() {
        Some("http") | Some("ws") => "ws",
        Some("https") | Some("wss") => "wss",
        Some(other) => {
            return Err(ConnectError::InvalidEndpoint(format!(
                "{}: unsupported scheme {}",
                origin, other
            )))
        }
        None => {
            return Err(ConnectError::InvalidEndpoint(format!("{}: missing scheme", origin)));
        }
    };

    let authority = uri
        .authority()
        .ok_or_else(|| ConnectError::InvalidEndpoint(format!("{}: missing host", origin)))?;

    Ok(format!("{}://{}{}", scheme, authority, VOICE_PATH))
}
