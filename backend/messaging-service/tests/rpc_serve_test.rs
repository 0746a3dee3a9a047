mod common;

use messaging_service::{config::Config, rpc, state::AppState};
use serde_json::{json, Value};

use common::fixture;

async fn roundtrip(state: &AppState, requests: &[Value]) -> Vec<Value> {
    let mut input = String::new();
    for request in requests {
        input.push_str(&request.to_string());
        input.push('\n');
    }
    let mut output = Vec::new();
    rpc::serve(state, input.as_bytes(), &mut output).await.unwrap();
    String::from_utf8(output)
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}

#[tokio::test]
async fn test_conversation_flow_over_json_lines() {
    let fx = fixture();
    let state = AppState::new(Config::default(), fx.collaborators.clone());

    let created = roundtrip(
        &state,
        &[json!({
            "id": "c1",
            "op": "create_direct_conversation",
            "user_a": fx.client.id,
            "user_b": fx.admin.id,
        })],
    )
    .await;
    assert_eq!(created[0]["ok"], true);
    let conversation_id = created[0]["result"]["id"].as_str().unwrap().to_string();

    let responses = roundtrip(
        &state,
        &[
            json!({
                "id": 1,
                "op": "send_message",
                "conversation_id": conversation_id,
                "sender_id": fx.client.id,
                "content": "Is my order shipped?",
            }),
            json!({
                "id": 2,
                "op": "send_message",
                "conversation_id": conversation_id,
                "sender_id": fx.other_client.id,
                "content": "Let me in",
            }),
            json!({ "id": 3, "op": "list_messages", "conversation_id": conversation_id }),
            json!({
                "id": 4,
                "op": "list_conversations",
                "user_id": fx.client.id,
                "role": "client",
            }),
        ],
    )
    .await;

    assert_eq!(responses.len(), 4);
    assert_eq!(responses[0]["id"], 1);
    assert_eq!(responses[0]["result"]["content"], "Is my order shipped?");
    assert_eq!(responses[1]["ok"], false);
    assert_eq!(responses[1]["error"]["code"], 403);
    assert_eq!(responses[2]["result"].as_array().unwrap().len(), 1);
    assert_eq!(responses[3]["result"][0]["title"], "Alex");
}

#[tokio::test]
async fn test_notification_inbox_over_json_lines() {
    let fx = fixture();
    let state = AppState::new(Config::default(), fx.collaborators.clone());
    let conv = state
        .messaging
        .create_direct_conversation(fx.admin.id, fx.client.id)
        .await
        .unwrap();
    let (_, fan_out) = state
        .messaging
        .send_message_tracked(conv.id, fx.admin.id, "Your order has shipped")
        .await
        .unwrap();
    fan_out.wait().await;

    let listed = roundtrip(
        &state,
        &[
            json!({ "op": "unread_notification_count", "user_id": fx.client.id }),
            json!({ "op": "list_notifications", "user_id": fx.client.id }),
        ],
    )
    .await;
    assert_eq!(listed[0]["result"]["unread"], 1);
    let notification = &listed[1]["result"][0];
    assert_eq!(notification["message"], "Alex: Your order has shipped");
    let notification_id = notification["id"].clone();

    let foreign = roundtrip(
        &state,
        &[json!({
            "op": "mark_notification_read",
            "user_id": fx.admin.id,
            "notification_id": notification_id,
        })],
    )
    .await;
    assert_eq!(foreign[0]["error"]["code"], 404);

    let cleared = roundtrip(
        &state,
        &[
            json!({ "op": "mark_all_notifications_read", "user_id": fx.client.id }),
            json!({ "op": "clear_notifications", "user_id": fx.client.id }),
            json!({ "op": "list_notifications", "user_id": fx.client.id }),
        ],
    )
    .await;
    assert_eq!(cleared[0]["result"]["updated"], 1);
    assert_eq!(cleared[1]["result"]["removed"], 1);
    assert_eq!(cleared[2]["result"], json!([]));
}

#[tokio::test]
async fn test_send_over_json_lines_then_list_notifications() {
    let fx = fixture();
    let state = AppState::new(Config::default(), fx.collaborators.clone());
    let conv = state
        .messaging
        .create_direct_conversation(fx.client.id, fx.admin.id)
        .await
        .unwrap();

    let responses = roundtrip(
        &state,
        &[
            json!({
                "op": "send_message",
                "conversation_id": conv.id,
                "sender_id": fx.client.id,
                "content": "Is the invoice ready?",
            }),
            json!({ "op": "list_notifications", "user_id": fx.admin.id }),
        ],
    )
    .await;
    assert_eq!(responses[0]["result"]["delivery"]["delivered"], 1);
    let inbox = responses[1]["result"].as_array().unwrap();
    assert_eq!(inbox.len(), 1);
    assert_eq!(inbox[0]["message"], "Jordan: Is the invoice ready?");
}

#[tokio::test]
async fn test_shutdown_finishes_untracked_fan_outs() {
    let fx = fixture();
    let state = AppState::new(Config::default(), fx.collaborators.clone());
    let conv = state
        .messaging
        .create_direct_conversation(fx.admin.id, fx.client.id)
        .await
        .unwrap();
    for text in ["one", "two", "three"] {
        state
            .messaging
            .send_message(conv.id, fx.admin.id, text)
            .await
            .unwrap();
    }

    state.shutdown().await;

    let listed = roundtrip(
        &state,
        &[json!({ "op": "unread_notification_count", "user_id": fx.client.id })],
    )
    .await;
    assert_eq!(listed[0]["result"]["unread"], 3);
}
