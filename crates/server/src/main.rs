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

mod connection;
mod sessions;
mod telnet;

use crate::sessions::SocketSessions;
use barn_common::model::ObjFlag;
use barn_db::ObjectStore;
use barn_kernel::config::Config;
use barn_kernel::tasks::scheduler::Scheduler;
use barn_kernel::tasks::ConnectionId;
use barn_var::Obj;
use clap::Parser;
use std::net::TcpListener;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "barn", about = "A MOO server.")]
struct Args {
    #[arg(
        long,
        value_name = "listen-address",
        help = "Listen address for telnet connections",
        default_value = "0.0.0.0"
    )]
    listen_address: String,

    #[arg(
        long,
        value_name = "listen-port",
        help = "Listen port for telnet connections",
        default_value = "7777"
    )]
    listen_port: u16,

    #[arg(long, value_name = "db", help = "Path of the checkpoint database")]
    db: Option<PathBuf>,

    #[arg(
        long,
        value_name = "seconds",
        help = "Interval between automatic checkpoints",
        default_value = "3600"
    )]
    checkpoint_interval: u64,

    #[arg(long, help = "Enable debug logging", default_value = "false")]
    debug: bool,
}

/// A minimal world for first boot: the system object and one wizard player.
fn bootstrap_world() -> ObjectStore {
    let mut world = ObjectStore::new();
    let system = world.create(vec![], Obj(0), false, None).expect("bootstrap");
    let wizard = world
        .create(vec![system], Obj(0), false, None)
        .expect("bootstrap");
    let w = world.get_mut(&wizard).expect("bootstrap");
    w.name = "Wizard".into();
    w.owner = wizard;
    w.flags.set(ObjFlag::User);
    w.flags.set(ObjFlag::Programmer);
    w.flags.set(ObjFlag::Wizard);
    world.get_mut(&system).expect("bootstrap").name = "System Object".into();
    warn!("no database found; booting an empty world (no login verbs yet)");
    world
}

fn main() {
    let args: Args = Args::parse();

    let main_subscriber = tracing_subscriber::fmt()
        .compact()
        .with_ansi(true)
        .with_max_level(if args.debug {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        })
        .finish();
    tracing::subscriber::set_global_default(main_subscriber)
        .expect("unable to configure logging");

    let config = Arc::new(Config {
        checkpoint_path: args.db.clone(),
        checkpoint_interval: Some(Duration::from_secs(args.checkpoint_interval)),
        ..Config::default()
    });

    // Restore from the checkpoint when one exists, else bootstrap.
    let (world, task_blob) = match &args.db {
        Some(path) if path.exists() => match barn_db::read_snapshot(path) {
            Ok(snapshot) => {
                info!(?path, "restoring world from checkpoint");
                snapshot.restore()
            }
            Err(e) => {
                error!(?path, error = %e, "could not read checkpoint");
                std::process::exit(1);
            }
        },
        _ => (bootstrap_world(), vec![]),
    };

    let sessions = Arc::new(SocketSessions::new());
    // The verb-source parser is an external collaborator; wired here as the
    // null parser, serving worlds whose verbs arrive precompiled.
    let parser = Arc::new(barn_compiler::NullParser);
    let (mut scheduler, client) =
        Scheduler::new(world, parser, config, sessions.clone());
    scheduler.restore_tasks(&task_blob);

    let listen_addr = format!("{}:{}", args.listen_address, args.listen_port);
    let listener = match TcpListener::bind(&listen_addr) {
        Ok(listener) => listener,
        Err(e) => {
            error!(%listen_addr, error = %e, "could not bind listener");
            std::process::exit(1);
        }
    };
    info!(%listen_addr, "listening for connections");

    let accept_sessions = sessions.clone();
    let accept_client = client.clone();
    std::thread::Builder::new()
        .name("barn-accept".into())
        .spawn(move || {
            let next_conn = AtomicU64::new(1);
            for stream in listener.incoming() {
                let stream = match stream {
                    Ok(stream) => stream,
                    Err(e) => {
                        warn!(error = %e, "accept failed");
                        continue;
                    }
                };
                let conn: ConnectionId = next_conn.fetch_add(1, Ordering::SeqCst);
                let peer = stream
                    .peer_addr()
                    .map(|a| a.to_string())
                    .unwrap_or_else(|_| "unknown".into());
                let write_half = match stream.try_clone() {
                    Ok(write_half) => write_half,
                    Err(e) => {
                        warn!(error = %e, "could not clone stream");
                        continue;
                    }
                };
                accept_sessions.register(conn, write_half, peer.clone());
                info!(conn, %peer, "accepted connection");

                let sessions = accept_sessions.clone();
                let client = accept_client.clone();
                std::thread::Builder::new()
                    .name(format!("barn-conn-{conn}"))
                    .spawn(move || {
                        connection::connection_loop(conn, stream, sessions, client);
                    })
                    .expect("spawn connection thread");
            }
        })
        .expect("spawn accept thread");

    // The scheduler owns this thread until shutdown.
    scheduler.run();
    info!("server exiting");
}
