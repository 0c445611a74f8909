//! Storing chat lines and pushing them to the owner's sessions.

use chrono::Utc;

use switchboard_shared::protocol::Notification;
use switchboard_shared::types::{UserId, WindowId};
use switchboard_store::{Message, NewMessage};

use crate::context::Context;
use crate::error::Result;

pub const CAT_MSG: &str = "msg";
pub const CAT_INFO: &str = "info";
pub const CAT_ERROR: &str = "error";
pub const CAT_BANNER: &str = "banner";

/// Store a line in one window and push it as `ADD_MESSAGES`.
pub async fn send(
    ctx: &Context,
    user: &UserId,
    window_id: WindowId,
    from: Option<&UserId>,
    cat: &str,
    body: &str,
) -> Result<Message> {
    let message = ctx
        .store
        .run(|db| {
            db.insert_message(NewMessage {
                window_id,
                user_id: from,
                body,
                cat,
                ts: Utc::now().timestamp(),
            })
        })
        .await?;

    ctx.outbox
        .queue_all(user, Notification::single_message(window_id, message.to_info()))
        .await?;

    Ok(message)
}

/// Store a server line in every window the user has on `network`.
pub async fn broadcast(ctx: &Context, user: &UserId, network: &str, cat: &str, body: &str) -> Result<()> {
    let windows = ctx
        .store
        .run(|db| db.windows_for_network(user, network))
        .await?;

    for window in windows {
        send(ctx, user, window.id, None, cat, body).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::context;
    use switchboard_shared::types::{SessionId, WindowType};
    use switchboard_store::NewWindow;

    #[tokio::test]
    async fn test_broadcast_hits_every_window_of_network() {
        let ctx = context();
        let user = UserId::new("m1");
        let session = SessionId::new();
        ctx.outbox.open_session(&user, &session).await.unwrap();

        ctx.store
            .run(|db| {
                for (network, name) in [("IRCNet", "#a"), ("IRCNet", "#b"), ("Other", "#c")] {
                    db.create_window(
                        &user,
                        NewWindow {
                            network,
                            name,
                            window_type: WindowType::Group,
                            peer: None,
                            password: None,
                        },
                    )?;
                }
                Ok(())
            })
            .await
            .unwrap();

        broadcast(&ctx, &user, "IRCNet", CAT_INFO, "Connecting to IRC server...")
            .await
            .unwrap();

        let batch = ctx
            .outbox
            .next_batch(&user, &session, None, std::time::Duration::ZERO)
            .await
            .unwrap();
        assert_eq!(batch.len(), 2);

        let stored = ctx
            .store
            .run(|db| db.messages_for_window(WindowId(3)))
            .await
            .unwrap();
        assert!(stored.is_empty());
    }
}
