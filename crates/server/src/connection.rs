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

use crate::sessions::SocketSessions;
use crate::telnet::LineAssembler;
use barn_kernel::tasks::scheduler::SchedulerClient;
use barn_kernel::tasks::ConnectionId;
use std::io::Read;
use std::net::TcpStream;
use std::sync::Arc;
use tracing::{debug, info};

/// Intrinsic client commands handled at the connection layer, before anything
/// reaches the scheduler. Returns true when the line was consumed.
fn intrinsic_command(
    sessions: &SocketSessions,
    conn: ConnectionId,
    line: &str,
) -> bool {
    let (word, rest) = match line.split_once(' ') {
        Some((word, rest)) => (word, Some(rest.to_string())),
        None => (line, None),
    };
    match word {
        "PREFIX" | "OUTPUTPREFIX" => {
            sessions.set_prefix(conn, rest);
            true
        }
        "SUFFIX" | "OUTPUTSUFFIX" => {
            sessions.set_suffix(conn, rest);
            true
        }
        _ => false,
    }
}

/// The per-connection reader: blocks on the socket, assembles lines, and feeds
/// them to the scheduler one at a time, waiting for each line's ack so input
/// order is preserved end to end.
pub fn connection_loop(
    conn: ConnectionId,
    mut stream: TcpStream,
    sessions: Arc<SocketSessions>,
    client: SchedulerClient,
) {
    info!(conn, "connection open");
    client.connected(conn);

    let mut assembler = LineAssembler::new();
    let mut buf = [0u8; 4096];
    loop {
        let n = match stream.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => {
                debug!(conn, error = %e, "read error");
                break;
            }
        };
        for line in assembler.push_bytes(&buf[..n]) {
            if intrinsic_command(&sessions, conn, &line) {
                continue;
            }
            // Blocks until the scheduler has processed the line.
            client.line(conn, line);
        }
    }

    info!(conn, "connection closed");
    client.disconnected(conn);
    sessions.deregister(conn);
}
