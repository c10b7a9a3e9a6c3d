use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tracing::{debug, info, warn};

use tonechat_types::events::{GatewayCommand, GatewayEvent};

use crate::registry::{Broadcaster, ConnectionId, GroupKey, GroupRegistry};

/// Heartbeat interval: server sends a Ping every 15 seconds.
/// If 2 consecutive Pongs are missed (~30s), the connection is dropped.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Serve one real-time connection until either side goes away.
///
/// A fresh connection belongs to no group; the client joins its inbox and
/// conversations explicitly. On exit the connection is removed from every
/// group it joined, whether or not the client left them.
pub async fn handle_connection(socket: WebSocket, registry: GroupRegistry) {
    let (mut sender, mut receiver) = socket.split();
    let (conn_id, mut events) = registry.connect();
    info!("Connection {} opened", conn_id);

    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received.clone();

    // Forward group events -> client, with heartbeat
    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut missed_heartbeats: u8 = 0;

        loop {
            tokio::select! {
                event = events.recv() => {
                    let Some(event) = event else { break };
                    let text = match serde_json::to_string(&event) {
                        Ok(text) => text,
                        Err(e) => {
                            warn!("Dropping unserializable event: {}", e);
                            continue;
                        }
                    };
                    if sender.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                _ = heartbeat.tick() => {
                    if pong_flag_send.swap(false, Ordering::Acquire) {
                        missed_heartbeats = 0;
                    } else {
                        missed_heartbeats += 1;
                        if missed_heartbeats >= 2 {
                            warn!("Heartbeat timeout (missed {} pongs), dropping connection", missed_heartbeats);
                            break;
                        }
                    }
                    if sender.send(Message::Ping(vec![].into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    // Read commands from client
    let registry_recv = registry.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => match serde_json::from_str::<GatewayCommand>(&text) {
                    Ok(cmd) => handle_command(&registry_recv, conn_id, cmd),
                    Err(e) => {
                        warn!(
                            "Connection {} bad command: {} -- raw: {}",
                            conn_id,
                            e,
                            text.chars().take(200).collect::<String>()
                        );
                    }
                },
                Message::Pong(_) => {
                    pong_flag_recv.store(true, Ordering::Release);
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    // Wait for either task to finish
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    registry.disconnect(conn_id);
    info!("Connection {} closed", conn_id);
}

/// Apply one client command. Membership changes take effect immediately.
pub fn handle_command(registry: &GroupRegistry, conn_id: ConnectionId, cmd: GatewayCommand) {
    match cmd {
        GatewayCommand::JoinUser { user_id } => {
            debug!("Connection {} joining inbox of {}", conn_id, user_id);
            registry.join(conn_id, GroupKey::inbox(user_id));
        }

        GatewayCommand::LeaveUser { user_id } => {
            registry.leave(conn_id, GroupKey::inbox(user_id));
        }

        GatewayCommand::JoinConversation { me, peer } => {
            debug!("Connection {} joining conversation {}<->{}", conn_id, me, peer);
            registry.join(conn_id, GroupKey::conversation(me, peer));
        }

        GatewayCommand::LeaveConversation { me, peer } => {
            registry.leave(conn_id, GroupKey::conversation(me, peer));
        }

        GatewayCommand::Typing { me, peer } => {
            registry.publish(
                &GroupKey::conversation(me, peer),
                &GatewayEvent::Typing { from: me, to: peer },
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn commands_drive_membership() {
        let registry = GroupRegistry::new();
        let (conn, mut rx) = registry.connect();

        handle_command(&registry, conn, GatewayCommand::JoinUser { user_id: 1 });
        handle_command(&registry, conn, GatewayCommand::JoinConversation { me: 1, peer: 2 });
        assert!(registry.members_of(&GroupKey::inbox(1)).contains(&conn));
        assert!(registry.members_of(&GroupKey::conversation(2, 1)).contains(&conn));

        handle_command(&registry, conn, GatewayCommand::Typing { me: 2, peer: 1 });
        assert_eq!(rx.recv().await, Some(GatewayEvent::Typing { from: 2, to: 1 }));

        handle_command(&registry, conn, GatewayCommand::LeaveConversation { me: 2, peer: 1 });
        handle_command(&registry, conn, GatewayCommand::LeaveUser { user_id: 1 });
        assert!(registry.groups_of(conn).is_empty());
    }

    #[test]
    fn typing_outside_any_group_goes_nowhere() {
        let registry = GroupRegistry::new();
        let (conn, mut rx) = registry.connect();
        handle_command(&registry, conn, GatewayCommand::Typing { me: 1, peer: 2 });
        assert!(rx.try_recv().is_err());
    }
}
