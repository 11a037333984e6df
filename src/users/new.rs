use rand::seq::IndexedRandom;

use crate::{
    auth::Session,
    hub::{Audience, ConnId, Hub, HubResult, UserInfo},
    proto::{Reply, RequestKind},
};

const ADJECTIVES: [&str; 16] = [
    "Quick", "Lazy", "Jolly", "Brave", "Silent", "Witty", "Clever", "Gentle",
    "Calm", "Bold", "Shy", "Happy", "Eager", "Rusty", "Golden", "Lucky",
];

const NOUNS: [&str; 16] = [
    "Fox", "Bear", "Eagle", "Wolf", "Tiger", "Owl", "Rabbit", "Falcon",
    "Hawk", "Panda", "Kitten", "Puppy", "Phoenix", "Turtle", "Dolphin", "Whale",
];

fn random_alias() -> String {
    let mut rng = rand::rng();
    format!(
        "{} {}",
        ADJECTIVES.choose(&mut rng).unwrap_or(&"Quiet"),
        NOUNS.choose(&mut rng).unwrap_or(&"Guest"),
    )
}

/// Register a password-less guest bound to `conn`. Guests without a display
/// name get a random alias.
pub async fn create_user(hub: &Hub, mut info: UserInfo, conn: &ConnId) -> HubResult<Reply> {
    if info.display_name.trim().is_empty() {
        info.display_name = random_alias();
    }
    let (user, token) = hub.create_user(info, None, Some(conn))?;

    let announced = hub
        .broadcast(
            Audience::All,
            RequestKind::CreateUser,
            &user,
            &[user.username.as_str()],
        )
        .await;

    let message = format!("User '{}' was created.", user.username);
    let reply = Reply::success(message).with_data(&Session { token, user })?;
    Ok(reply.delivered(announced))
}
