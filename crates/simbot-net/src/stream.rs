//! TCP 流式广播服务器
//!
//! 接受循环 + 每连接一个发送线程。每个连接以配置频率（独立于引擎和
//! 点到点频率）推送一行换行分隔的 JSON 状态快照；每个 tick 先排空
//! 入站数据（格式切换 + 解析链分发），再发送快照，因此格式切换严格
//! 在生效后才反映到快照里。
//!
//! 超过连接上限的连接被拒绝（记录日志后直接丢弃）。慢客户端或已断开
//! 的客户端只在读写失败时被发现，连接随即拆除；没有背压或缓冲。

use crate::error::NetError;
use crate::message::handle_client_message;
use crate::parser::ParserChain;
use simbot_core::{AngleFormat, Robot};
use std::io::{ErrorKind, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// 入站轮询间隔（同时为连接循环提供节拍）
const RECV_POLL_INTERVAL: Duration = Duration::from_millis(5);

/// 接受循环空转时的睡眠
const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// 广播服务器配置（两个传输共用）
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// 监听地址
    pub host: String,
    /// 监听端口（0 = 系统分配）
    pub port: u16,
    /// 快照发送频率（Hz）
    pub send_rate_hz: f64,
    /// 连接数上限，超出的连接被拒绝
    pub max_clients: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 0,
            send_rate_hz: 10.0,
            max_clients: 5,
        }
    }
}

/// TCP 流式广播服务器句柄
pub struct StreamServer {
    local_addr: SocketAddr,
    running: Arc<AtomicBool>,
    accept_handle: Option<JoinHandle<()>>,
    clients: Arc<AtomicUsize>,
}

impl StreamServer {
    /// 绑定监听地址并启动接受循环
    pub fn start(
        robot: Arc<Robot>,
        chain: Arc<ParserChain>,
        config: ServerConfig,
    ) -> Result<Self, NetError> {
        let addr = format!("{}:{}", config.host, config.port);
        let listener = TcpListener::bind(&addr).map_err(|source| NetError::Bind {
            addr: addr.clone(),
            source,
        })?;
        listener.set_nonblocking(true)?;
        let local_addr = listener.local_addr()?;
        info!("[stream_server]: listening for connections on {}", local_addr);

        let running = Arc::new(AtomicBool::new(true));
        let clients = Arc::new(AtomicUsize::new(0));

        let accept_running = running.clone();
        let accept_clients = clients.clone();
        let accept_handle = std::thread::Builder::new()
            .name("stream_server".to_string())
            .spawn(move || {
                accept_loop(
                    listener,
                    robot,
                    chain,
                    config,
                    accept_running,
                    accept_clients,
                );
                info!("[stream_server]: accept loop stopped");
            })?;

        Ok(Self {
            local_addr,
            running,
            accept_handle: Some(accept_handle),
            clients,
        })
    }

    /// 实际监听地址（端口 0 绑定后由系统分配）
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// 当前连接数
    pub fn client_count(&self) -> usize {
        self.clients.load(Ordering::Relaxed)
    }

    /// 停止服务器
    ///
    /// 接受循环 join 等待退出；连接线程在下一个 tick 观察到停止标志
    /// 后自行退出。
    pub fn shutdown(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        if let Some(handle) = self.accept_handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for StreamServer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn accept_loop(
    listener: TcpListener,
    robot: Arc<Robot>,
    chain: Arc<ParserChain>,
    config: ServerConfig,
    running: Arc<AtomicBool>,
    clients: Arc<AtomicUsize>,
) {
    while running.load(Ordering::Relaxed) {
        match listener.accept() {
            Ok((stream, addr)) => {
                if clients.load(Ordering::Relaxed) >= config.max_clients {
                    warn!("[stream_server]: connection refused to {}", addr);
                    continue; // 丢弃 stream 即关闭
                }
                clients.fetch_add(1, Ordering::Relaxed);
                info!("[stream_server]: got connection from {}", addr);

                let robot = robot.clone();
                let chain = chain.clone();
                let running = running.clone();
                let clients = clients.clone();
                let clients_thread = clients.clone();
                let send_rate = config.send_rate_hz;
                let spawned = std::thread::Builder::new()
                    .name(format!("stream_client_{}", addr.port()))
                    .spawn(move || {
                        match connection_loop(&robot, &chain, stream, addr, send_rate, &running) {
                            Ok(()) => info!("[stream_server]: connection with {} closed", addr),
                            Err(e) => {
                                info!("[stream_server]: connection with {} closed: {}", addr, e)
                            },
                        }
                        clients_thread.fetch_sub(1, Ordering::Relaxed);
                    });
                if let Err(e) = spawned {
                    error!("[stream_server]: failed to spawn client thread: {}", e);
                    clients.fetch_sub(1, Ordering::Relaxed);
                }
            },
            Err(e) if e.kind() == ErrorKind::WouldBlock => {
                std::thread::sleep(ACCEPT_POLL_INTERVAL);
            },
            Err(e) => {
                error!("[stream_server]: accept error: {}", e);
                std::thread::sleep(ACCEPT_POLL_INTERVAL);
            },
        }
    }
}

/// 单连接发送循环
///
/// 阻塞式 socket + 短读超时：读超时充当循环节拍，写保持阻塞语义
/// 以避免半帧写入。
fn connection_loop(
    robot: &Robot,
    chain: &ParserChain,
    mut stream: TcpStream,
    addr: SocketAddr,
    send_rate_hz: f64,
    running: &AtomicBool,
) -> std::io::Result<()> {
    stream.set_read_timeout(Some(RECV_POLL_INTERVAL))?;
    stream.set_write_timeout(Some(Duration::from_secs(1)))?;
    stream.set_nodelay(true)?;

    let peer = addr.to_string();
    let period = Duration::from_secs_f64(1.0 / send_rate_hz);
    let mut format = AngleFormat::Relative;
    let mut pending: Vec<u8> = Vec::new();
    let mut buf = [0u8; 4096];
    let mut last_send: Option<Instant> = None;

    while running.load(Ordering::Relaxed) {
        // 1. 排空入站数据（读超时 = 节拍）
        match stream.read(&mut buf) {
            Ok(0) => return Ok(()), // 对端关闭
            Ok(n) => {
                pending.extend_from_slice(&buf[..n]);
                while let Some(pos) = pending.iter().position(|&b| b == b'\n') {
                    let line: Vec<u8> = pending.drain(..=pos).collect();
                    let Ok(text) = std::str::from_utf8(&line[..line.len() - 1]) else {
                        warn!("[stream_server]: non-utf8 message from {}", peer);
                        continue;
                    };
                    debug!("[stream_server]: got message from {}: {}", peer, text);
                    if let Some(reply) = handle_client_message(chain, text, &mut format, &peer) {
                        stream.write_all(reply.as_bytes())?;
                        stream.write_all(b"\n")?;
                    }
                }
            },
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {},
            Err(e) if e.kind() == ErrorKind::Interrupted => {},
            Err(e) => return Err(e),
        }

        // 2. 到期则发送快照（入站先于快照处理，保证格式切换的顺序语义）
        let due = last_send.is_none_or(|t| t.elapsed() >= period);
        if due {
            last_send = Some(Instant::now());
            match serde_json::to_string(&robot.status(format)) {
                Ok(snapshot) => {
                    stream.write_all(snapshot.as_bytes())?;
                    stream.write_all(b"\n")?;
                },
                Err(e) => error!("[stream_server]: snapshot serialization failed: {}", e),
            }
        }
    }
    Ok(())
}
