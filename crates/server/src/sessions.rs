// Copyright (C) 2025 Barn Authors. This program is free software: you can
// redistribute it and/or modify it under the terms of the GNU General Public
// License as published by the Free Software Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

use barn_kernel::tasks::sessions::Sessions;
use barn_kernel::tasks::ConnectionId;
use std::collections::HashMap;
use std::io::Write;
use std::net::{Shutdown, TcpStream};
use std::sync::Mutex;
use tracing::warn;

struct ConnState {
    stream: TcpStream,
    peer: String,
    buffer: Vec<String>,
    prefix: Option<String>,
    suffix: Option<String>,
}

/// The socket-facing sessions registry. The scheduler buffers lines here; they
/// hit the wire (CRLF-terminated) only on flush, so a verb's output lands
/// atomically.
#[derive(Default)]
pub struct SocketSessions {
    state: Mutex<HashMap<ConnectionId, ConnState>>,
}

impl SocketSessions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, conn: ConnectionId, stream: TcpStream, peer: String) {
        self.state.lock().unwrap().insert(
            conn,
            ConnState {
                stream,
                peer,
                buffer: vec![],
                prefix: None,
                suffix: None,
            },
        );
    }

    pub fn deregister(&self, conn: ConnectionId) {
        self.state.lock().unwrap().remove(&conn);
    }

    /// PREFIX/OUTPUTPREFIX: a string wrapped around subsequent eval output.
    pub fn set_prefix(&self, conn: ConnectionId, prefix: Option<String>) {
        if let Some(state) = self.state.lock().unwrap().get_mut(&conn) {
            state.prefix = prefix;
        }
    }

    /// SUFFIX/OUTPUTSUFFIX, analogously.
    pub fn set_suffix(&self, conn: ConnectionId, suffix: Option<String>) {
        if let Some(state) = self.state.lock().unwrap().get_mut(&conn) {
            state.suffix = suffix;
        }
    }
}

impl Sessions for SocketSessions {
    fn send_line(&self, conn: ConnectionId, line: &str) {
        if let Some(state) = self.state.lock().unwrap().get_mut(&conn) {
            state.buffer.push(line.to_string());
        }
    }

    fn send_eval_result(&self, conn: ConnectionId, lines: &[String]) {
        if let Some(state) = self.state.lock().unwrap().get_mut(&conn) {
            if let Some(prefix) = state.prefix.clone() {
                state.buffer.push(prefix);
            }
            state.buffer.extend(lines.iter().cloned());
            if let Some(suffix) = state.suffix.clone() {
                state.buffer.push(suffix);
            }
        }
    }

    fn flush(&self, conn: ConnectionId) {
        let mut state = self.state.lock().unwrap();
        let Some(conn_state) = state.get_mut(&conn) else {
            return;
        };
        if conn_state.buffer.is_empty() {
            return;
        }
        let mut out = String::new();
        for line in conn_state.buffer.drain(..) {
            out.push_str(&line);
            out.push_str("\r\n");
        }
        if let Err(e) = conn_state.stream.write_all(out.as_bytes()) {
            warn!(conn, error = %e, "write failed; dropping output");
        }
    }

    fn disconnect(&self, conn: ConnectionId) {
        self.flush(conn);
        let mut state = self.state.lock().unwrap();
        if let Some(conn_state) = state.remove(&conn) {
            let _ = conn_state.stream.shutdown(Shutdown::Both);
        }
    }

    fn connection_name(&self, conn: ConnectionId) -> String {
        self.state
            .lock()
            .unwrap()
            .get(&conn)
            .map(|s| s.peer.clone())
            .unwrap_or_else(|| format!("connection {conn}"))
    }

    fn buffered_len(&self, conn: ConnectionId) -> usize {
        self.state
            .lock()
            .unwrap()
            .get(&conn)
            .map(|s| s.buffer.iter().map(|l| l.len() + 2).sum())
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use std::net::TcpListener;

    fn socket_pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).unwrap();
        let (server, _) = listener.accept().unwrap();
        (server, client)
    }

    fn read_available(stream: &mut TcpStream) -> String {
        stream
            .set_read_timeout(Some(std::time::Duration::from_millis(200)))
            .unwrap();
        let mut buf = [0u8; 4096];
        let n = stream.read(&mut buf).unwrap_or(0);
        String::from_utf8_lossy(&buf[..n]).into_owned()
    }

    #[test]
    fn output_is_buffered_until_flush_and_crlf_terminated() {
        let (server, mut client) = socket_pair();
        let sessions = SocketSessions::new();
        sessions.register(7, server, "127.0.0.1:test".into());

        sessions.send_line(7, "one");
        sessions.send_line(7, "two");
        assert_eq!(sessions.buffered_len(7), 10);

        sessions.flush(7);
        assert_eq!(read_available(&mut client), "one\r\ntwo\r\n");
        assert_eq!(sessions.buffered_len(7), 0);
    }

    #[test]
    fn eval_results_are_wrapped_in_prefix_and_suffix() {
        let (server, mut client) = socket_pair();
        let sessions = SocketSessions::new();
        sessions.register(7, server, "127.0.0.1:test".into());
        sessions.set_prefix(7, Some("===begin===".into()));
        sessions.set_suffix(7, Some("===end===".into()));

        sessions.send_eval_result(7, &["{1, 4}".to_string()]);
        sessions.flush(7);
        assert_eq!(
            read_available(&mut client),
            "===begin===\r\n{1, 4}\r\n===end===\r\n"
        );

        // Clearing the prefix stops the wrapping.
        sessions.set_prefix(7, None);
        sessions.set_suffix(7, None);
        sessions.send_eval_result(7, &["{1, 5}".to_string()]);
        sessions.flush(7);
        assert_eq!(read_available(&mut client), "{1, 5}\r\n");
    }
}
