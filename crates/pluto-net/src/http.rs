//! HTTP form POST used for master-server heartbeats.
//!
//! Requests go through a blocking `ureq` agent on Tokio's blocking pool, so
//! the tick path never waits on them: callers either spawn [`post_form`] or
//! await it once while shutting down.

use std::time::Duration;

use crate::transport::{TransportError, with_default_port};

/// Errors from a heartbeat POST.
#[derive(Debug, thiserror::Error)]
pub enum HttpError {
    /// The server address could not be understood.
    #[error(transparent)]
    Address(#[from] TransportError),

    /// Connecting, sending or reading the reply failed or timed out.
    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: Box<ureq::Error>,
    },

    /// The blocking task running the request panicked or was cancelled.
    #[error("heartbeat task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// The URL a form is posted to.
pub fn form_url(server: &str, path: &str) -> Result<String, TransportError> {
    let address = with_default_port(server, 80)?;
    let slash = if path.starts_with('/') { "" } else { "/" };
    Ok(format!("http://{address}{slash}{path}"))
}

/// POSTs `fields` as `application/x-www-form-urlencoded` to
/// `http://<server><path>` and returns the status code. Error statuses are
/// returned as codes, not errors.
///
/// The whole exchange must finish within `timeout`.
pub async fn post_form(
    server: &str,
    path: &str,
    fields: &[(&str, String)],
    timeout: Duration,
) -> Result<u16, HttpError> {
    let url = form_url(server, path)?;
    let fields: Vec<(String, String)> = fields
        .iter()
        .map(|(key, value)| (key.to_string(), value.clone()))
        .collect();

    tokio::task::spawn_blocking(move || {
        let agent = ureq::AgentBuilder::new().timeout(timeout).build();
        let form: Vec<(&str, &str)> = fields
            .iter()
            .map(|(key, value)| (key.as_str(), value.as_str()))
            .collect();
        match agent.post(&url).send_form(&form) {
            Ok(response) => Ok(response.status()),
            Err(ureq::Error::Status(code, _)) => Ok(code),
            Err(e) => Err(HttpError::Request {
                url,
                source: Box::new(e),
            }),
        }
    })
    .await?
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Accepts one request, answers with `status_line`, and returns the
    /// request text.
    async fn answer_one(listener: TcpListener, until: &'static str, status_line: &'static str) -> String {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut received = Vec::new();
        let mut chunk = [0u8; 256];
        while !String::from_utf8_lossy(&received).ends_with(until) {
            let n = stream.read(&mut chunk).await.unwrap();
            if n == 0 {
                break;
            }
            received.extend_from_slice(&chunk[..n]);
        }
        let reply = format!("{status_line}\r\nContent-Length: 0\r\n\r\n");
        stream.write_all(reply.as_bytes()).await.unwrap();
        String::from_utf8_lossy(&received).into_owned()
    }

    #[test]
    fn test_form_url_adds_port_and_slash() {
        assert_eq!(
            form_url("master.example", "list").unwrap(),
            "http://master.example:80/list"
        );
        assert_eq!(
            form_url("10.0.0.1:8080", "/").unwrap(),
            "http://10.0.0.1:8080/"
        );
        assert!(form_url("  ", "/").is_err());
    }

    #[tokio::test]
    async fn test_post_form_against_local_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(answer_one(listener, "Test+Game", "HTTP/1.1 200 OK"));

        let status = post_form(
            &addr.to_string(),
            "/list",
            &[("name", "Test Game".to_string())],
            Duration::from_secs(2),
        )
        .await
        .unwrap();
        assert_eq!(status, 200);

        let request = server.await.unwrap();
        assert!(request.starts_with("POST /list HTTP/1.1"));
        assert!(request.contains("application/x-www-form-urlencoded"));
        assert!(request.ends_with("name=Test+Game"));
    }

    #[tokio::test]
    async fn test_error_status_is_returned_as_code() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(answer_one(listener, "port=1", "HTTP/1.1 404 Not Found"));

        let status = post_form(
            &addr.to_string(),
            "/",
            &[("port", "1".to_string())],
            Duration::from_secs(2),
        )
        .await
        .unwrap();
        assert_eq!(status, 404);
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_post_form_times_out_on_silent_server() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let _held = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
            drop(stream);
        });

        let result = post_form(&addr.to_string(), "/", &[], Duration::from_millis(100)).await;
        assert!(matches!(result, Err(HttpError::Request { .. })));
    }
}
