//! Simbot 守护进程主入口
//!
//! 加载机器人配置，启动收敛引擎与两个广播服务器（TCP 流式 +
//! WebSocket），运行到 Ctrl-C。
//!
//! ```bash
//! simbot --config demos/example_robot.json --socket-port 65432 --ws-port 65433
//! ```

use clap::Parser;
use simbot_core::{MotionEngine, Robot, RobotParams};
use simbot_model::RobotConfig;
use simbot_net::{CommandParser, ParserChain, ServerConfig, StreamServer, WsServer};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{error, info};

/// Simbot 守护进程
///
/// 模拟并驱动一台关节机器人的舵机，通过 TCP / WebSocket 向远程
/// 观察者实时广播状态并接收控制指令
#[derive(Parser, Debug)]
#[command(name = "simbot")]
#[command(about = "Simbot daemon - realtime servo state broadcast", long_about = None)]
#[command(version)]
struct Args {
    /// 机器人配置文件路径（JSON）
    #[arg(long, short = 'c')]
    config: PathBuf,

    /// 监听地址
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// TCP 流式广播端口
    #[arg(long, default_value_t = 65432)]
    socket_port: u16,

    /// WebSocket 广播端口（0 = 禁用）
    #[arg(long, default_value_t = 65433)]
    ws_port: u16,

    /// 快照发送频率（Hz）
    #[arg(long, default_value_t = 10.0)]
    send_rate: f64,

    /// 每个传输的连接数上限
    #[arg(long, default_value_t = 5)]
    max_clients: usize,

    /// 全局速度倍率（>0，越小越慢）
    #[arg(long, default_value_t = 1.0)]
    speed: f64,

    /// 引擎收敛频率（Hz，0 = 禁用引擎，instant 模式）
    #[arg(long, default_value_t = 50.0)]
    motors_rate: f64,

    /// 点到点步进频率（Hz）
    #[arg(long, default_value_t = 10.0)]
    ptp_rate: f64,

    /// 运动文件路径（姿态表持久化，可选）
    #[arg(long)]
    motion_file: Option<PathBuf>,
}

fn main() {
    // 初始化日志
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    if let Err(e) = run(args) {
        error!("fatal: {}", e);
        process::exit(1);
    }
}

fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    // 1. 配置加载（致命错误直接退出）
    let config = RobotConfig::from_file(&args.config)?;
    let robot = Robot::from_config(
        config,
        RobotParams {
            robot_speed: args.speed,
            motors_rate_hz: args.motors_rate,
            ptp_rate_hz: args.ptp_rate,
            motion_file: args.motion_file,
        },
    )?;

    // 2. 收敛引擎
    let mut engine = MotionEngine::start(robot.clone());

    // 3. 解析链（两个传输共用同一条链）
    let mut chain = ParserChain::new();
    chain.register(Box::new(CommandParser::new(robot.clone())));
    let chain = Arc::new(chain);

    // 4. 广播服务器
    let mut stream_server = StreamServer::start(
        robot.clone(),
        chain.clone(),
        ServerConfig {
            host: args.host.clone(),
            port: args.socket_port,
            send_rate_hz: args.send_rate,
            max_clients: args.max_clients,
        },
    )?;
    info!("stream server ready on {}", stream_server.local_addr());

    let mut ws_server = if args.ws_port > 0 {
        let server = WsServer::start(
            robot.clone(),
            chain,
            ServerConfig {
                host: args.host,
                port: args.ws_port,
                send_rate_hz: args.send_rate,
                max_clients: args.max_clients,
            },
        )?;
        info!("websocket server ready on {}", server.local_addr());
        Some(server)
    } else {
        info!("websocket server disabled");
        None
    };

    // 5. 运行到 Ctrl-C
    let running = Arc::new(AtomicBool::new(true));
    let ctrlc_running = running.clone();
    ctrlc::set_handler(move || {
        info!("shutdown signal received");
        ctrlc_running.store(false, Ordering::Relaxed);
    })?;

    info!(
        "robot '{}' running ({} motors, {} sensors)",
        robot.configuration().name,
        robot.motors().len(),
        robot.sensors().len()
    );
    while running.load(Ordering::Relaxed) {
        std::thread::sleep(Duration::from_millis(100));
    }

    // 6. 有序停机
    if let Some(server) = ws_server.as_mut() {
        server.shutdown();
    }
    stream_server.shutdown();
    engine.shutdown();
    info!("shutdown complete");
    Ok(())
}
