//! WebSocket 广播服务器
//!
//! 消息式传输：接受循环完成握手并把客户端移交给**共享发送循环**。
//! 发送循环在第一个订阅者到来时按需启动，最后一个订阅者断开后自动
//! 停止（下个订阅者再来时重新启动）。
//!
//! 每个 tick 共享循环先排空所有客户端的入站帧（格式切换 + 解析链
//! 分发），再按每连接格式发送快照；同一 tick 内 relative / absolute
//! 两种快照各序列化至多一次，供所有客户端复用。
//!
//! 客户端死亡（读写失败、收到 Close 帧）即被移出并丢弃 socket——
//! 与流式传输一样，没有背压。

use crate::error::NetError;
use crate::message::handle_client_message;
use crate::parser::ParserChain;
use crossbeam_channel::{Receiver, Sender};
use simbot_core::{AngleFormat, Robot};
use std::io::ErrorKind;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::stream::ServerConfig;

/// 共享循环的轮询间隔
const POLL_INTERVAL: Duration = Duration::from_millis(5);

/// 接受循环空转时的睡眠
const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// 握手阶段的读超时（握手在阻塞模式下完成）
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

/// 已完成握手的客户端（由共享发送循环独占持有）
struct WsClient {
    socket: tungstenite::WebSocket<TcpStream>,
    peer: String,
    format: AngleFormat,
    alive: bool,
}

/// WebSocket 广播服务器句柄
pub struct WsServer {
    local_addr: SocketAddr,
    running: Arc<AtomicBool>,
    accept_handle: Option<JoinHandle<()>>,
    subscribers: Arc<AtomicUsize>,
    sender_active: Arc<AtomicBool>,
}

impl WsServer {
    /// 绑定监听地址并启动接受循环
    ///
    /// 共享发送循环此时不启动——它在第一个订阅者完成握手后才被拉起。
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
        info!("[ws_server]: listening for connections on {}", local_addr);

        let running = Arc::new(AtomicBool::new(true));
        let subscribers = Arc::new(AtomicUsize::new(0));
        let sender_active = Arc::new(AtomicBool::new(false));
        let (tx, rx) = crossbeam_channel::unbounded::<WsClient>();

        let ctx = AcceptContext {
            robot,
            chain,
            config,
            running: running.clone(),
            subscribers: subscribers.clone(),
            sender_active: sender_active.clone(),
            tx,
            rx,
        };
        let accept_handle = std::thread::Builder::new()
            .name("ws_server".to_string())
            .spawn(move || {
                accept_loop(listener, ctx);
                info!("[ws_server]: accept loop stopped");
            })?;

        Ok(Self {
            local_addr,
            running,
            accept_handle: Some(accept_handle),
            subscribers,
            sender_active,
        })
    }

    /// 实际监听地址
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// 当前订阅者数量
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.load(Ordering::SeqCst)
    }

    /// 共享发送循环是否在运行
    pub fn is_broadcasting(&self) -> bool {
        self.sender_active.load(Ordering::SeqCst)
    }

    /// 停止服务器
    pub fn shutdown(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        if let Some(handle) = self.accept_handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for WsServer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// 接受循环与共享发送循环之间共享的上下文
struct AcceptContext {
    robot: Arc<Robot>,
    chain: Arc<ParserChain>,
    config: ServerConfig,
    running: Arc<AtomicBool>,
    subscribers: Arc<AtomicUsize>,
    sender_active: Arc<AtomicBool>,
    tx: Sender<WsClient>,
    rx: Receiver<WsClient>,
}

fn accept_loop(listener: TcpListener, ctx: AcceptContext) {
    while ctx.running.load(Ordering::Relaxed) {
        match listener.accept() {
            Ok((stream, addr)) => {
                if ctx.subscribers.load(Ordering::SeqCst) >= ctx.config.max_clients {
                    warn!("[ws_server]: connection refused to {}", addr);
                    continue;
                }
                match perform_handshake(stream, addr) {
                    Ok(client) => {
                        info!("[ws_server]: got connection from {}", addr);
                        ctx.subscribers.fetch_add(1, Ordering::SeqCst);
                        if ctx.tx.send(client).is_err() {
                            // 通道只在进程退出时关闭
                            ctx.subscribers.fetch_sub(1, Ordering::SeqCst);
                            continue;
                        }
                        ensure_broadcast_loop(&ctx);
                    },
                    Err(e) => warn!("[ws_server]: handshake with {} failed: {}", addr, e),
                }
            },
            Err(e) if e.kind() == ErrorKind::WouldBlock => {
                std::thread::sleep(ACCEPT_POLL_INTERVAL);
            },
            Err(e) => {
                error!("[ws_server]: accept error: {}", e);
                std::thread::sleep(ACCEPT_POLL_INTERVAL);
            },
        }
    }
}

/// 在阻塞模式下完成 WebSocket 握手，成功后切换到非阻塞
fn perform_handshake(stream: TcpStream, addr: SocketAddr) -> Result<WsClient, tungstenite::Error> {
    stream.set_read_timeout(Some(HANDSHAKE_TIMEOUT))?;
    stream.set_nodelay(true)?;
    let socket = tungstenite::accept(stream).map_err(|e| match e {
        tungstenite::handshake::HandshakeError::Failure(e) => e,
        tungstenite::handshake::HandshakeError::Interrupted(_) => {
            tungstenite::Error::Io(ErrorKind::WouldBlock.into())
        },
    })?;
    socket.get_ref().set_nonblocking(true)?;
    socket.get_ref().set_read_timeout(None)?;
    Ok(WsClient {
        socket,
        peer: addr.to_string(),
        format: AngleFormat::Relative,
        alive: true,
    })
}

/// 惰性启动共享发送循环
///
/// `sender_active` 为 false 时拉起新循环；swap 保证同一时刻至多一个
/// 循环在运行。
fn ensure_broadcast_loop(ctx: &AcceptContext) {
    if ctx.sender_active.swap(true, Ordering::SeqCst) {
        return; // 已在运行
    }
    info!("[ws_broadcast]: send loop starting");

    let robot = ctx.robot.clone();
    let chain = ctx.chain.clone();
    let running = ctx.running.clone();
    let subscribers = ctx.subscribers.clone();
    let sender_active = ctx.sender_active.clone();
    let tx = ctx.tx.clone();
    let rx = ctx.rx.clone();
    let send_rate_hz = ctx.config.send_rate_hz;

    let spawned = std::thread::Builder::new()
        .name("ws_broadcast".to_string())
        .spawn(move || {
            broadcast_loop(
                robot,
                chain,
                send_rate_hz,
                running,
                subscribers.clone(),
                sender_active.clone(),
                tx,
                rx,
            );
        });
    if let Err(e) = spawned {
        error!("[ws_broadcast]: failed to spawn send loop: {}", e);
        ctx.sender_active.store(false, Ordering::SeqCst);
    }
}

#[allow(clippy::too_many_arguments)]
fn broadcast_loop(
    robot: Arc<Robot>,
    chain: Arc<ParserChain>,
    send_rate_hz: f64,
    running: Arc<AtomicBool>,
    subscribers: Arc<AtomicUsize>,
    sender_active: Arc<AtomicBool>,
    tx: Sender<WsClient>,
    rx: Receiver<WsClient>,
) {
    let period = Duration::from_secs_f64(1.0 / send_rate_hz);
    let mut clients: Vec<WsClient> = Vec::new();
    let mut last_send: Option<Instant> = None;

    while running.load(Ordering::Relaxed) {
        // 接收新订阅者
        while let Ok(client) = rx.try_recv() {
            clients.push(client);
        }

        if clients.is_empty() {
            // 惰性停止：先清标志，再二次检查通道，避免与 accept 线程竞争
            sender_active.store(false, Ordering::SeqCst);
            match rx.try_recv() {
                Ok(client) => {
                    if !sender_active.swap(true, Ordering::SeqCst) {
                        clients.push(client);
                        continue;
                    }
                    // accept 线程刚拉起了新循环，把客户端转交过去
                    let _ = tx.send(client);
                    return;
                },
                Err(_) => {
                    info!("[ws_broadcast]: stopped due to inactivity");
                    return;
                },
            }
        }

        // 1. 每个客户端先排空入站帧（格式切换在快照之前生效）
        for client in clients.iter_mut() {
            drain_client(client, &chain);
        }

        // 2. 到期则发送快照，两种格式各序列化一次
        let due = last_send.is_none_or(|t| t.elapsed() >= period);
        if due {
            last_send = Some(Instant::now());
            let mut relative: Option<String> = None;
            let mut absolute: Option<String> = None;
            for client in clients.iter_mut().filter(|c| c.alive) {
                let cache = match client.format {
                    AngleFormat::Relative => &mut relative,
                    AngleFormat::Absolute => &mut absolute,
                };
                if cache.is_none() {
                    match serde_json::to_string(&robot.status(client.format)) {
                        Ok(snapshot) => *cache = Some(snapshot),
                        Err(e) => {
                            error!("[ws_broadcast]: snapshot serialization failed: {}", e);
                            continue;
                        },
                    }
                }
                let payload = cache.as_ref().expect("cache filled above").clone();
                if let Err(e) = client.socket.send(tungstenite::Message::text(payload)) {
                    if !is_would_block(&e) {
                        info!("[ws_broadcast]: connection closed with {}: {}", client.peer, e);
                        client.alive = false;
                    }
                }
            }
        }

        // 3. 移除死客户端
        let before = clients.len();
        clients.retain(|c| c.alive);
        let removed = before - clients.len();
        if removed > 0 {
            subscribers.fetch_sub(removed, Ordering::SeqCst);
        }

        spin_sleep::sleep(POLL_INTERVAL);
    }

    // 停机：释放剩余客户端
    subscribers.fetch_sub(clients.len(), Ordering::SeqCst);
    sender_active.store(false, Ordering::SeqCst);
    info!("[ws_broadcast]: send loop stopped");
}

/// 排空单个客户端的入站帧
fn drain_client(client: &mut WsClient, chain: &ParserChain) {
    if !client.alive {
        return;
    }
    loop {
        match client.socket.read() {
            Ok(tungstenite::Message::Text(text)) => {
                debug!("[ws_server]: got message from {}: {}", client.peer, text);
                handle_text(client, chain, text.as_str());
            },
            Ok(tungstenite::Message::Binary(bytes)) => match std::str::from_utf8(&bytes) {
                Ok(text) => handle_text(client, chain, text),
                Err(_) => warn!("[ws_server]: non-utf8 binary message from {}", client.peer),
            },
            Ok(tungstenite::Message::Close(_)) => {
                client.alive = false;
                return;
            },
            // Ping/Pong 由 tungstenite 自动应答
            Ok(_) => {},
            Err(e) if is_would_block(&e) => return,
            Err(e) => {
                debug!("[ws_server]: read error from {}: {}", client.peer, e);
                client.alive = false;
                return;
            },
        }
    }
}

fn handle_text(client: &mut WsClient, chain: &ParserChain, text: &str) {
    let peer = client.peer.clone();
    if let Some(reply) = handle_client_message(chain, text, &mut client.format, &peer) {
        if let Err(e) = client.socket.send(tungstenite::Message::text(reply)) {
            if !is_would_block(&e) {
                info!("[ws_server]: connection closed with {}: {}", peer, e);
                client.alive = false;
            }
        }
    }
}

fn is_would_block(e: &tungstenite::Error) -> bool {
    matches!(e, tungstenite::Error::Io(io) if io.kind() == ErrorKind::WouldBlock)
}
