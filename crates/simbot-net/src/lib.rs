//! 网络层：指令解析链与实时状态广播
//!
//! 本 crate 把 `simbot-core` 的机器人状态暴露给远程观察者/控制端：
//! - [`ParserChain`]：有序的指令解析器链，首个非空响应短路返回
//! - [`CommandParser`]：内置的 C2R/R2C JSON 请求-响应协议
//! - [`StreamServer`]：TCP 传输，每连接一个发送循环，换行分隔 JSON
//! - [`WsServer`]：WebSocket 传输，共享发送循环按需启停
//!
//! 两个传输相互独立，各自周期性地把状态快照推给订阅者。每个连接
//! 维护自己的角度格式偏好（relative / absolute），可随时通过带内
//! 控制消息 `{"socket": {"format": "absolute"}}` 切换；切换在快照
//! 发送之前处理，因此客户端绝不会在切换生效前收到新格式的快照。
//!
//! 投递是 fire-and-forget：慢客户端或断开的客户端只在发送/接收失败
//! 时被发现，随即拆除连接；没有显式的背压或缓冲，每个 tick 独立。

mod error;
mod message;
mod parser;
mod stream;
mod websocket;

pub use error::NetError;
pub use message::handle_client_message;
pub use parser::{CommandParser, Parser, ParserChain};
pub use stream::{ServerConfig, StreamServer};
pub use websocket::WsServer;
