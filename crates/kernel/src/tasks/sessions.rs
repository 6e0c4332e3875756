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

use crate::tasks::ConnectionId;
use std::collections::HashMap;
use std::sync::Mutex;

/// The scheduler's window onto connection output. Lines accumulate per connection
/// and reach the socket only at `flush`, which the scheduler calls when a task
/// completes, suspends or asks explicitly; a verb's output is atomic that way.
pub trait Sessions: Send + Sync {
    /// Buffer one output line for a connection.
    fn send_line(&self, conn: ConnectionId, line: &str);

    /// Buffer an eval result, wrapped in the connection's PREFIX/SUFFIX if set.
    fn send_eval_result(&self, conn: ConnectionId, lines: &[String]);

    /// Push buffered output down the wire.
    fn flush(&self, conn: ConnectionId);

    /// Sever the connection after flushing anything pending.
    fn disconnect(&self, conn: ConnectionId);

    /// The host/port description of the connection, for `connection_name`.
    fn connection_name(&self, conn: ConnectionId) -> String;

    /// Bytes currently buffered, for `buffered_output_length`.
    fn buffered_len(&self, conn: ConnectionId) -> usize;
}

/// An in-memory sessions implementation used by kernel tests (and usable as a
/// bit bucket). Captures everything, flushes nowhere.
#[derive(Default)]
pub struct BufferedSessions {
    state: Mutex<HashMap<ConnectionId, Vec<String>>>,
}

impl BufferedSessions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines_for(&self, conn: ConnectionId) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .get(&conn)
            .cloned()
            .unwrap_or_default()
    }
}

impl Sessions for BufferedSessions {
    fn send_line(&self, conn: ConnectionId, line: &str) {
        self.state
            .lock()
            .unwrap()
            .entry(conn)
            .or_default()
            .push(line.to_string());
    }

    fn send_eval_result(&self, conn: ConnectionId, lines: &[String]) {
        let mut state = self.state.lock().unwrap();
        let buffer = state.entry(conn).or_default();
        buffer.extend(lines.iter().cloned());
    }

    fn flush(&self, _conn: ConnectionId) {}

    fn disconnect(&self, conn: ConnectionId) {
        self.state.lock().unwrap().remove(&conn);
    }

    fn connection_name(&self, conn: ConnectionId) -> String {
        format!("test connection {conn}")
    }

    fn buffered_len(&self, conn: ConnectionId) -> usize {
        self.lines_for(conn).iter().map(|l| l.len()).sum()
    }
}
