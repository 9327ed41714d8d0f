use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use dashmap::DashMap;
use futures_util::{stream::StreamExt, SinkExt};
use parking_lot::{Mutex as P_Mutex, RwLock as P_RwLock};
use rand::Rng;
use tokio::sync::{mpsc, RwLock};
use tracing::info;
use uuid::Uuid;

use squirrel_core::{
    apply_action, clear_transient_reveals, start_match, start_next_round, ClientMessage,
    GameState, PeerId, RosterEntry, Rules, ServerMessage, SessionCode,
};

// 口令字符表：去掉了容易念错的 I/O/0/1
const CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
const CODE_LEN: usize = 4;

// 换牌/替换后的短暂展示窗口，到时由宿主复位并重新广播
const REVEAL_DURATION: Duration = Duration::from_millis(1200);

const DEFAULT_ADDR: ([u8; 4], u16) = ([0, 0, 0, 0], 26014);

// 宿主全局状态
struct AppState {
    sessions: DashMap<SessionCode, Arc<Session>>,
}

// 单个会话的状态
// 重要‼️：严格规定使用锁的顺序，避免死锁：
// members -> host_id -> game
struct Session {
    code: SessionCode,
    game: P_Mutex<Option<GameState>>,
    host_id: P_RwLock<PeerId>,
    // 将 PeerId 映射到具体的网络连接
    members: RwLock<HashMap<PeerId, MemberConnection>>,
    // 单调递增的入座序号，决定名单和发牌座次
    join_seq: AtomicU64,
}

// 会话成员的连接信息
struct MemberConnection {
    name: String,
    seq: u64,
    // 用于向该成员的 WebSocket 任务发送消息的通道
    sender: mpsc::Sender<ServerMessage>,
}

type SharedState = Arc<AppState>;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let state = SharedState::new(AppState {
        sessions: DashMap::new(),
    });

    let app = Router::new()
        .route("/ws", get(websocket_handler))
        .with_state(state);

    let addr = match std::env::var("SQUIRREL_ADDR") {
        Ok(s) => s.parse().expect("SQUIRREL_ADDR 不是合法的监听地址"),
        Err(_) => SocketAddr::from(DEFAULT_ADDR),
    };
    info!("宿主正在监听 {}", addr);
    axum::serve(tokio::net::TcpListener::bind(addr).await.unwrap(), app)
        .await
        .unwrap();
}

/// 处理 WebSocket 连接请求
async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<SharedState>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

/// 处理单个 WebSocket 连接的生命周期
async fn handle_socket(socket: WebSocket, state: SharedState) {
    let (mut sender, mut receiver) = socket.split();

    // 创建一个 MPSC 通道，用于从其他任务接收要发送的消息
    let (tx, mut rx) = mpsc::channel::<ServerMessage>(32);

    // 启动一个新任务，专门负责将 MPSC 通道中的消息发送到 WebSocket
    tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let payload = serde_json::to_string(&msg).unwrap();
            if sender.send(Message::Text(payload.into())).await.is_err() {
                // 发送失败，说明客户端已断开，退出任务
                break;
            }
        }
    });

    // 当前连接的上下文信息，在加入会话后填充
    let mut member_context: Option<(SessionCode, PeerId)> = None;

    // 主循环，处理从客户端接收到的消息
    while let Some(Ok(msg)) = receiver.next().await {
        if let Message::Text(text) = msg {
            match serde_json::from_str::<ClientMessage>(&text) {
                Ok(client_msg) => {
                    handle_client_message(client_msg, state.clone(), &tx, &mut member_context)
                        .await;
                }
                Err(e) => {
                    tracing::warn!("解析消息失败: {}", e);
                }
            }
        }
    }

    // 客户端断开连接，执行清理工作
    if let Some((code, peer_id)) = member_context {
        handle_disconnect(state, code, peer_id).await;
    }
    info!("客户端连接关闭");
}

/// 核心消息处理逻辑
async fn handle_client_message(
    msg: ClientMessage,
    state: SharedState,
    tx: &mpsc::Sender<ServerMessage>,
    context: &mut Option<(SessionCode, PeerId)>,
) {
    match msg {
        ClientMessage::CreateSession { nickname } => {
            if context.is_some() {
                let _ = tx
                    .send(ServerMessage::Error {
                        message: "你已经在一个会话里了".to_string(),
                    })
                    .await;
                return;
            }

            let code = generate_session_code(&state);
            let peer_id = Uuid::new_v4();

            let mut session = Session {
                code: code.clone(),
                game: P_Mutex::new(None),
                host_id: P_RwLock::new(peer_id),
                members: RwLock::new(HashMap::new()),
                join_seq: AtomicU64::new(0),
            };
            session.members.get_mut().insert(
                peer_id,
                MemberConnection {
                    name: nickname,
                    seq: session.join_seq.fetch_add(1, Ordering::Relaxed),
                    sender: tx.clone(),
                },
            );
            let session = Arc::new(session);
            let roster = roster_of(&session).await;
            state.sessions.insert(code.clone(), session);

            info!("玩家 {} 创建了新会话 {}", peer_id, code);
            *context = Some((code.clone(), peer_id));
            let _ = tx
                .send(ServerMessage::SessionJoined {
                    your_id: peer_id,
                    code,
                    roster,
                })
                .await;
        }
        ClientMessage::JoinSession { code, nickname } => {
            if context.is_some() {
                let _ = tx
                    .send(ServerMessage::Error {
                        message: "你已经在一个会话里了".to_string(),
                    })
                    .await;
                return;
            }

            let code = code.to_uppercase();
            let session = match state.sessions.get(&code) {
                Some(s) => s.clone(),
                None => {
                    let _ = tx
                        .send(ServerMessage::Error {
                            message: "口令无效，会话不存在".to_string(),
                        })
                        .await;
                    return;
                }
            };

            let peer_id = Uuid::new_v4();
            {
                // members write lock
                let mut members = session.members.write().await;
                if members.len() >= 6 {
                    let _ = tx
                        .send(ServerMessage::Error {
                            message: "会话已满（最多 6 人）".to_string(),
                        })
                        .await;
                    return;
                }
                if session.game.lock().as_ref().is_some_and(|g| !g.is_match_over()) {
                    let _ = tx
                        .send(ServerMessage::Error {
                            message: "对局已经开始，不能中途加入".to_string(),
                        })
                        .await;
                    return;
                }
                members.insert(
                    peer_id,
                    MemberConnection {
                        name: nickname,
                        seq: session.join_seq.fetch_add(1, Ordering::Relaxed),
                        sender: tx.clone(),
                    },
                );
            }

            info!("玩家 {} 加入了会话 {}", peer_id, code);
            *context = Some((code.clone(), peer_id));

            let roster = roster_of(&session).await;
            broadcast(
                session.members.read().await.iter(),
                &ServerMessage::RosterUpdate {
                    players: roster.clone(),
                },
                Some(peer_id),
            )
            .await;
            let _ = tx
                .send(ServerMessage::SessionJoined {
                    your_id: peer_id,
                    code,
                    roster,
                })
                .await;
        }
        ClientMessage::LeaveSession => {
            if let Some((code, peer_id)) = context.take() {
                handle_disconnect(state, code, peer_id).await;
                let _ = tx
                    .send(ServerMessage::Info {
                        message: "已离开会话".to_string(),
                    })
                    .await;
            }
        }
        // ... 需要先在会话里才能执行的消息
        _ => {
            let Some((code, peer_id)) = context else {
                let _ = tx
                    .send(ServerMessage::Error {
                        message: "请先加入或创建会话".to_string(),
                    })
                    .await;
                return;
            };
            let session = match state.sessions.get(code) {
                None => {
                    let _ = tx
                        .send(ServerMessage::Error {
                            message: "会话不存在".to_string(),
                        })
                        .await;
                    return;
                }
                Some(s) => s.clone(),
            };
            handle_session_message(msg, session, tx, *peer_id).await;
        }
    }
}

/// 会话内的对局消息处理
async fn handle_session_message(
    msg: ClientMessage,
    session: Arc<Session>,
    tx: &mpsc::Sender<ServerMessage>,
    peer_id: PeerId,
) {
    match msg {
        ClientMessage::StartMatch => {
            // members read lock
            let members = session.members.read().await;
            let host_id = *session.host_id.read();
            if peer_id != host_id {
                let _ = tx
                    .send(ServerMessage::Error {
                        message: "只有宿主可以开始对局".to_string(),
                    })
                    .await;
                return;
            }

            let mut seats: Vec<(u64, String, PeerId)> = members
                .iter()
                .map(|(id, conn)| (conn.seq, conn.name.clone(), *id))
                .collect();
            seats.sort_by_key(|(seq, _, _)| *seq);

            if !(2..=6).contains(&seats.len()) {
                let _ = tx
                    .send(ServerMessage::Error {
                        message: "需要 2 到 6 名玩家才能开始".to_string(),
                    })
                    .await;
                return;
            }

            let snapshot = {
                // game lock
                let mut game = session.game.lock();
                if game.as_ref().is_some_and(|g| !g.is_match_over()) {
                    None
                } else {
                    let new_state = start_match(
                        seats
                            .into_iter()
                            .map(|(_, name, id)| (name, Some(id)))
                            .collect(),
                        Rules::default(),
                    );
                    let snapshot = new_state.clone();
                    *game = Some(new_state);
                    Some(snapshot)
                }
            };
            match snapshot {
                Some(snapshot) => {
                    info!("会话 {} 的对局开始", session.code);
                    broadcast(members.iter(), &ServerMessage::MatchStart(snapshot), None).await;
                }
                None => {
                    let _ = tx
                        .send(ServerMessage::Error {
                            message: "对局已在进行中".to_string(),
                        })
                        .await;
                }
            }
        }
        ClientMessage::PerformAction(action) => {
            // 动作发起者只由连接身份解析，消息内容不被信任
            let outcome = {
                // game lock
                let mut game = session.game.lock();
                match game.as_mut() {
                    None => None,
                    Some(state) => match state.player_index_of(&peer_id) {
                        None => None,
                        Some(actor) => {
                            if apply_action(state, actor, &action) {
                                let reveal_pending = state
                                    .players
                                    .iter()
                                    .any(|p| p.hand.iter().any(|s| s.face_up));
                                Some((state.clone(), reveal_pending))
                            } else {
                                None
                            }
                        }
                    },
                }
            };
            match outcome {
                Some((snapshot, reveal_pending)) => {
                    broadcast(
                        session.members.read().await.iter(),
                        &ServerMessage::StateBroadcast(snapshot),
                        None,
                    )
                    .await;
                    if reveal_pending {
                        schedule_reveal_reset(session.clone());
                    }
                }
                // 不合法的动作静默丢弃，连接方不会收到任何回应
                None => {
                    tracing::debug!("玩家 {} 的动作 {:?} 被拒绝", peer_id, action);
                }
            }
        }
        ClientMessage::NextRound => {
            let host_id = *session.host_id.read();
            if peer_id != host_id {
                let _ = tx
                    .send(ServerMessage::Error {
                        message: "只有宿主可以开始下一局".to_string(),
                    })
                    .await;
                return;
            }
            let snapshot = {
                // game lock
                let mut game = session.game.lock();
                match game.as_mut() {
                    Some(state) => {
                        if start_next_round(state) {
                            Some(state.clone())
                        } else {
                            None
                        }
                    }
                    _ => None,
                }
            };
            match snapshot {
                Some(snapshot) => {
                    broadcast(
                        session.members.read().await.iter(),
                        &ServerMessage::StateBroadcast(snapshot),
                        None,
                    )
                    .await;
                }
                None => {
                    let _ = tx
                        .send(ServerMessage::Error {
                            message: "现在不能开始下一局".to_string(),
                        })
                        .await;
                }
            }
        }
        _ => {
            let _ = tx
                .send(ServerMessage::Error {
                    message: "该消息在会话内无效".to_string(),
                })
                .await;
        }
    }
}

/// 短暂展示窗口到期后复位所有翻开的牌并重新广播
fn schedule_reveal_reset(session: Arc<Session>) {
    tokio::spawn(async move {
        tokio::time::sleep(REVEAL_DURATION).await;
        let snapshot = {
            // game lock
            let mut game = session.game.lock();
            match game.as_mut() {
                Some(state) => {
                    if clear_transient_reveals(state) {
                        Some(state.clone())
                    } else {
                        None
                    }
                }
                _ => None,
            }
        };
        if let Some(snapshot) = snapshot {
            broadcast(
                session.members.read().await.iter(),
                &ServerMessage::StateBroadcast(snapshot),
                None,
            )
            .await;
        }
    });
}

/// 成员断开连接（或主动离开）后的处理
async fn handle_disconnect(state: SharedState, code: SessionCode, peer_id: PeerId) {
    info!("玩家 {} 从会话 {} 断开连接", peer_id, code);
    let session = match state.sessions.get(&code) {
        None => return,
        Some(s) => s.clone(),
    };

    // members write lock
    let mut members = session.members.write().await;
    members.remove(&peer_id);

    if members.is_empty() {
        state.sessions.remove(&code);
        info!("会话 {} 已空，已被移除", code);
        return;
    }

    // 如果宿主断开，把宿主权转移给最早加入的剩余成员
    let host_id = *session.host_id.read();
    if peer_id == host_id {
        if let Some((&new_host_id, conn)) = members.iter().min_by_key(|(_, c)| c.seq) {
            *session.host_id.write() = new_host_id;
            let info_msg = ServerMessage::Info {
                message: format!("原宿主已断开，新宿主是 {}", conn.name),
            };
            broadcast(members.iter(), &info_msg, None).await;
            info!("会话 {} 的宿主已转移给 {}", code, new_host_id);
        }
    }

    let host_id = *session.host_id.read();
    let mut entries: Vec<(u64, RosterEntry)> = members
        .iter()
        .map(|(id, conn)| {
            (
                conn.seq,
                RosterEntry {
                    id: *id,
                    name: conn.name.clone(),
                    is_host: *id == host_id,
                },
            )
        })
        .collect();
    entries.sort_by_key(|(seq, _)| *seq);
    let roster: Vec<RosterEntry> = entries.into_iter().map(|(_, e)| e).collect();
    broadcast(
        members.iter(),
        &ServerMessage::RosterUpdate { players: roster },
        None,
    )
    .await;
}

/// 按入座顺序生成当前名单
async fn roster_of(session: &Session) -> Vec<RosterEntry> {
    // members read lock
    let members = session.members.read().await;
    let host_id = *session.host_id.read();
    let mut entries: Vec<(u64, RosterEntry)> = members
        .iter()
        .map(|(id, conn)| {
            (
                conn.seq,
                RosterEntry {
                    id: *id,
                    name: conn.name.clone(),
                    is_host: *id == host_id,
                },
            )
        })
        .collect();
    entries.sort_by_key(|(seq, _)| *seq);
    entries.into_iter().map(|(_, e)| e).collect()
}

/// 生成一个当前没被占用的会话口令
fn generate_session_code(state: &AppState) -> SessionCode {
    let mut rng = rand::rng();
    loop {
        let code: String = (0..CODE_LEN)
            .map(|_| CODE_ALPHABET[rng.random_range(0..CODE_ALPHABET.len())] as char)
            .collect();
        if !state.sessions.contains_key(&code) {
            return code;
        }
    }
}

/// 向会话内所有成员广播消息
async fn broadcast(
    members: impl Iterator<Item = (&PeerId, &MemberConnection)>,
    message: &ServerMessage,
    exclude: Option<PeerId>,
) {
    for (peer_id, conn) in members {
        if Some(*peer_id) == exclude {
            continue;
        }
        if conn.sender.send(message.clone()).await.is_err() {
            // 发送失败，说明该成员也断开了，后续由其自己的 handle_socket 任务处理
            tracing::warn!("向玩家 {} 发送消息失败（可能已断开）", peer_id);
        }
    }
}
