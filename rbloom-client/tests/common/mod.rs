#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::io::{BufRead, BufReader, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;
use rbloom_client::{ClientConfig, ClusterConfig};
use tracing_subscriber::EnvFilter;

pub type Handler = dyn Fn(&[Vec<u8>]) -> Vec<u8> + Send + Sync;

/// In-process RESP server that answers every command through a handler
/// and records what it received.
pub struct MockServer {
    pub addr: String,
    log: Arc<Mutex<Vec<Vec<Vec<u8>>>>>,
}

impl MockServer {
    pub fn start<F>(handler: F) -> Self
    where
        F: Fn(&[Vec<u8>]) -> Vec<u8> + Send + Sync + 'static,
    {
        Self::start_with(move |_| handler)
    }

    /// Like `start`, but the handler is built knowing the bound port.
    pub fn start_with<B, F>(build: B) -> Self
    where
        B: FnOnce(u16) -> F,
        F: Fn(&[Vec<u8>]) -> Vec<u8> + Send + Sync + 'static,
    {
        init_tracing();
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let local = listener.local_addr().expect("addr");
        let handler: Arc<Handler> = Arc::new(build(local.port()));
        let log = Arc::new(Mutex::new(Vec::new()));

        let accept_log = Arc::clone(&log);
        thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(stream) = stream else { break };
                let handler = Arc::clone(&handler);
                let log = Arc::clone(&accept_log);
                thread::spawn(move || serve(stream, handler, log));
            }
        });

        MockServer {
            addr: local.to_string(),
            log,
        }
    }

    pub fn port(&self) -> u16 {
        self.addr
            .rsplit_once(':')
            .and_then(|(_, port)| port.parse().ok())
            .expect("port")
    }

    pub fn commands(&self) -> Vec<Vec<Vec<u8>>> {
        self.log.lock().clone()
    }

    /// Number of received commands whose keyword is `keyword`.
    pub fn count(&self, keyword: &str) -> usize {
        self.log
            .lock()
            .iter()
            .filter(|args| args.first().map(Vec::as_slice) == Some(keyword.as_bytes()))
            .count()
    }

    pub fn keywords(&self) -> Vec<String> {
        self.log
            .lock()
            .iter()
            .map(|args| String::from_utf8_lossy(&args[0]).into_owned())
            .collect()
    }
}

fn serve(stream: TcpStream, handler: Arc<Handler>, log: Arc<Mutex<Vec<Vec<Vec<u8>>>>>) {
    let _ = stream.set_read_timeout(Some(Duration::from_secs(5)));
    let mut writer = stream.try_clone().expect("clone");
    let mut reader = BufReader::new(stream);
    while let Ok(args) = read_command(&mut reader) {
        let reply = handler(&args);
        log.lock().push(args);
        if writer.write_all(&reply).and_then(|_| writer.flush()).is_err() {
            break;
        }
    }
}

/// A port nothing listens on.
pub fn dead_addr() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let addr = listener.local_addr().expect("addr").to_string();
    drop(listener);
    addr
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn client_config(addr: &str) -> ClientConfig {
    ClientConfig {
        pool_size: 2,
        max_idle: 2,
        socket_timeout: Duration::from_secs(2),
        connect_timeout: Duration::from_secs(1),
        eviction_interval: Duration::ZERO,
        ..ClientConfig::for_addr(addr).expect("addr")
    }
}

pub fn cluster_config(seeds: &[&str], max_attempts: usize) -> ClusterConfig {
    let mut config = ClusterConfig::with_seeds(seeds.iter().copied());
    config.max_attempts = max_attempts;
    config.node = client_config(seeds[0]);
    config
}

// ============================================================================
// RESP framing
// ============================================================================

fn read_command(reader: &mut BufReader<TcpStream>) -> std::io::Result<Vec<Vec<u8>>> {
    let mut line = Vec::new();
    read_line(reader, &mut line)?.ok_or_else(|| std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "eof"))?;
    if line.first() != Some(&b'*') {
        return Err(std::io::Error::new(std::io::ErrorKind::InvalidData, "expected array"));
    }
    let count = parse_usize(&line[1..])?;
    let mut args = Vec::with_capacity(count);
    for _ in 0..count {
        read_line(reader, &mut line)?.ok_or_else(|| std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "eof"))?;
        if line.first() != Some(&b'$') {
            return Err(std::io::Error::new(std::io::ErrorKind::InvalidData, "expected bulk"));
        }
        let len = parse_usize(&line[1..])?;
        let mut data = vec![0u8; len];
        reader.read_exact(&mut data)?;
        let mut crlf = [0u8; 2];
        reader.read_exact(&mut crlf)?;
        if crlf != [b'\r', b'\n'] {
            return Err(std::io::Error::new(std::io::ErrorKind::InvalidData, "missing crlf"));
        }
        args.push(data);
    }
    Ok(args)
}

fn read_line(reader: &mut BufReader<TcpStream>, buf: &mut Vec<u8>) -> std::io::Result<Option<()>> {
    buf.clear();
    let bytes = reader.read_until(b'\n', buf)?;
    if bytes == 0 {
        return Ok(None);
    }
    if buf.len() < 2 || buf[buf.len() - 2] != b'\r' {
        return Err(std::io::Error::new(std::io::ErrorKind::InvalidData, "invalid line"));
    }
    buf.truncate(buf.len() - 2);
    Ok(Some(()))
}

fn parse_usize(data: &[u8]) -> std::io::Result<usize> {
    std::str::from_utf8(data)
        .ok()
        .and_then(|text| text.parse().ok())
        .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::InvalidData, "digit"))
}

pub fn simple(msg: &str) -> Vec<u8> {
    format!("+{msg}\r\n").into_bytes()
}

pub fn error(msg: &str) -> Vec<u8> {
    format!("-{msg}\r\n").into_bytes()
}

pub fn integer(value: i64) -> Vec<u8> {
    format!(":{value}\r\n").into_bytes()
}

pub fn bulk(data: &[u8]) -> Vec<u8> {
    let mut out = format!("${}\r\n", data.len()).into_bytes();
    out.extend_from_slice(data);
    out.extend_from_slice(b"\r\n");
    out
}

pub fn nil() -> Vec<u8> {
    b"$-1\r\n".to_vec()
}

/// Array of already-encoded elements.
pub fn array(items: Vec<Vec<u8>>) -> Vec<u8> {
    let mut out = format!("*{}\r\n", items.len()).into_bytes();
    for item in items {
        out.extend_from_slice(&item);
    }
    out
}

/// `CLUSTER SLOTS` reply assigning each `(start, end, port)` range to 127.0.0.1.
pub fn cluster_slots(ranges: &[(u16, u16, u16)]) -> Vec<u8> {
    array(
        ranges
            .iter()
            .map(|&(start, end, port)| {
                array(vec![
                    integer(i64::from(start)),
                    integer(i64::from(end)),
                    array(vec![bulk(b"127.0.0.1"), integer(i64::from(port))]),
                ])
            })
            .collect(),
    )
}

// ============================================================================
// Toy filter store
// ============================================================================

struct Filter {
    capacity: i64,
    items: HashSet<Vec<u8>>,
}

/// Set-backed stand-in for the filter module: exact membership, no false
/// positives. Enough to check how the client frames and decodes commands.
#[derive(Default)]
pub struct ToyStore {
    filters: Mutex<HashMap<Vec<u8>, Filter>>,
}

impl ToyStore {
    pub fn handle(&self, args: &[Vec<u8>]) -> Vec<u8> {
        let keyword = String::from_utf8_lossy(&args[0]).to_ascii_uppercase();
        let mut filters = self.filters.lock();
        match keyword.as_str() {
            "PING" => simple("PONG"),
            "AUTH" | "CLIENT" => simple("OK"),
            "BF.RESERVE" | "CF.RESERVE" => {
                if filters.contains_key(&args[1]) {
                    return error("ERR item exists");
                }
                let capacity = if keyword == "BF.RESERVE" { &args[3] } else { &args[2] };
                let capacity = String::from_utf8_lossy(capacity).parse().unwrap_or(0);
                filters.insert(
                    args[1].clone(),
                    Filter {
                        capacity,
                        items: HashSet::new(),
                    },
                );
                simple("OK")
            }
            "BF.ADD" | "CF.ADDNX" => {
                let filter = filters.entry(args[1].clone()).or_insert_with(|| Filter {
                    capacity: 100,
                    items: HashSet::new(),
                });
                integer(i64::from(filter.items.insert(args[2].clone())))
            }
            "CF.ADD" => {
                let filter = filters.entry(args[1].clone()).or_insert_with(|| Filter {
                    capacity: 1024,
                    items: HashSet::new(),
                });
                filter.items.insert(args[2].clone());
                integer(1)
            }
            "BF.MADD" => {
                let filter = filters.entry(args[1].clone()).or_insert_with(|| Filter {
                    capacity: 100,
                    items: HashSet::new(),
                });
                array(
                    args[2..]
                        .iter()
                        .map(|item| integer(i64::from(filter.items.insert(item.clone()))))
                        .collect(),
                )
            }
            "BF.EXISTS" | "CF.EXISTS" => {
                let found = filters
                    .get(&args[1])
                    .map_or(false, |filter| filter.items.contains(&args[2]));
                integer(i64::from(found))
            }
            "BF.MEXISTS" => {
                let filter = filters.get(&args[1]);
                array(
                    args[2..]
                        .iter()
                        .map(|item| {
                            integer(i64::from(filter.map_or(false, |f| f.items.contains(item))))
                        })
                        .collect(),
                )
            }
            "CF.DEL" => match filters.get_mut(&args[1]) {
                Some(filter) => integer(i64::from(filter.items.remove(&args[2]))),
                None => error("ERR not found"),
            },
            "BF.INFO" | "CF.INFO" => match filters.get(&args[1]) {
                Some(filter) => array(vec![
                    simple("Capacity"),
                    integer(filter.capacity),
                    simple("Size"),
                    integer(filter.capacity * 2),
                    simple("Number of filters"),
                    integer(1),
                    simple("Number of items inserted"),
                    integer(filter.items.len() as i64),
                    simple("Expansion rate"),
                    integer(2),
                ]),
                None => error("ERR not found"),
            },
            "DEL" => integer(i64::from(filters.remove(&args[1]).is_some())),
            _ => error("ERR unknown command"),
        }
    }
}

/// Mock server backed by a fresh `ToyStore`.
pub fn toy_server() -> MockServer {
    let store = ToyStore::default();
    MockServer::start(move |args| store.handle(args))
}
