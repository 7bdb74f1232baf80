//! Management catalog tests against an in-memory server
//!
//! Each test checks the method name and parameter shape a wrapper puts on
//! the wire, and that the canned result decodes into the typed value.

use msmp::management::{IpAddress, IpBan, Operator, Player, TypedRule, UserBan};
use msmp::{Management, MsmpClient, MsmpConfig, MsmpError};
use msmp_client::{MemoryConnector, MemoryPeer, Request, Response};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

async fn setup() -> (Management, MemoryPeer) {
    let (connector, mut listener) = MemoryConnector::pair();
    let config = MsmpConfig::new("memory://test", "secret")
        .no_reconnect()
        .call_timeout(Duration::from_secs(2));
    let client = MsmpClient::builder(config)
        .connector(Arc::new(connector))
        .build();

    client.connect().await.expect("Failed to connect");
    let peer = tokio::time::timeout(Duration::from_secs(2), listener.accept())
        .await
        .expect("No connection")
        .expect("Connector dropped");
    (Management::new(client), peer)
}

/// Answer the next request with `result` and hand it back for inspection
fn answer_once(mut peer: MemoryPeer, result: Value) -> JoinHandle<(Request, MemoryPeer)> {
    tokio::spawn(async move {
        let request = peer.recv_request().await.expect("No request");
        peer.respond(&Response::success(request.id, result)).unwrap();
        (request, peer)
    })
}

#[tokio::test]
async fn test_status() {
    let (mgmt, peer) = setup().await;
    let server = answer_once(
        peer,
        json!({
            "players": [{"id": "853c80ef-3c37-49fd-aa49-938b674adae6", "name": "jeb_"}],
            "started": true,
            "version": {"name": "1.21.9", "protocol": 773}
        }),
    );

    let state = mgmt.status().await.unwrap();
    assert!(state.started);
    assert_eq!(state.version.name, "1.21.9");
    assert_eq!(state.players[0].name.as_deref(), Some("jeb_"));

    let (request, _peer) = server.await.unwrap();
    assert_eq!(request.method, "minecraft:server/status");
    assert!(request.params.is_none());
}

#[tokio::test]
async fn test_system_message_params() {
    let (mgmt, peer) = setup().await;
    let server = answer_once(peer, json!(true));

    assert_eq!(mgmt.system_message("Restarting in 5 minutes").await.unwrap(), json!(true));

    let (request, _peer) = server.await.unwrap();
    assert_eq!(request.method, "minecraft:server/system_message");
    assert_eq!(request.params, Some(json!([{"message": "Restarting in 5 minutes"}])));
}

#[tokio::test]
async fn test_allowlist_add() {
    let (mgmt, peer) = setup().await;
    let server = answer_once(peer, json!([{"name": "jeb_"}, {"name": "Dinnerbone"}]));

    let list = mgmt.allowlist().add(&Player::named("Dinnerbone")).await.unwrap();
    assert_eq!(list.len(), 2);

    let (request, _peer) = server.await.unwrap();
    assert_eq!(request.method, "minecraft:allowlist/add");
    assert_eq!(request.params, Some(json!([{"name": "Dinnerbone"}])));
}

#[tokio::test]
async fn test_allowlist_set_wraps_list() {
    let (mgmt, peer) = setup().await;
    let server = answer_once(peer, json!([{"id": "abc", "name": "jeb_"}]));

    let players = [Player::with_id("abc", "jeb_")];
    mgmt.allowlist().set(&players).await.unwrap();

    let (request, _peer) = server.await.unwrap();
    assert_eq!(request.method, "minecraft:allowlist/set");
    assert_eq!(request.params, Some(json!([[{"id": "abc", "name": "jeb_"}]])));
}

#[tokio::test]
async fn test_bans_add() {
    let (mgmt, peer) = setup().await;
    let server = answer_once(peer, json!([{"player": {"name": "griefer"}, "reason": "tnt"}]));

    let mut ban = UserBan::new(Player::named("griefer"));
    ban.reason = Some("tnt".to_string());
    let bans = mgmt.bans().add(&ban).await.unwrap();
    assert_eq!(bans, vec![ban]);

    let (request, _peer) = server.await.unwrap();
    assert_eq!(request.method, "minecraft:bans/add");
}

#[tokio::test]
async fn test_ip_bans_remove_by_address() {
    let (mgmt, peer) = setup().await;
    let server = answer_once(peer, json!([]));

    let remaining: Vec<IpBan> = mgmt
        .ip_bans()
        .remove(&IpAddress { ip: "203.0.113.7".to_string() })
        .await
        .unwrap();
    assert!(remaining.is_empty());

    let (request, _peer) = server.await.unwrap();
    assert_eq!(request.method, "minecraft:ip_bans/remove");
    assert_eq!(request.params, Some(json!([{"ip": "203.0.113.7"}])));
}

#[tokio::test]
async fn test_operators_clear() {
    let (mgmt, peer) = setup().await;
    let server = answer_once(peer, json!([]));

    let ops: Vec<Operator> = mgmt.operators().clear().await.unwrap();
    assert!(ops.is_empty());

    let (request, _peer) = server.await.unwrap();
    assert_eq!(request.method, "minecraft:operators/clear");
    assert!(request.params.is_none());
}

#[tokio::test]
async fn test_gamerules_update() {
    let (mgmt, peer) = setup().await;
    let server = answer_once(peer, json!([{"key": "keepInventory", "value": "true", "type": "boolean"}]));

    let rule = TypedRule {
        key: "keepInventory".to_string(),
        value: "true".to_string(),
        kind: Some("boolean".to_string()),
    };
    let rules = mgmt.update_gamerules(&[rule.clone()]).await.unwrap();
    assert_eq!(rules, vec![rule]);

    let (request, _peer) = server.await.unwrap();
    assert_eq!(request.method, "minecraft:gamerules/update");
    assert_eq!(
        request.params,
        Some(json!([[{"key": "keepInventory", "value": "true", "type": "boolean"}]]))
    );
}

#[tokio::test]
async fn test_kick_params() {
    let (mgmt, peer) = setup().await;
    let server = answer_once(peer, json!([{"name": "griefer"}]));

    mgmt.kick(Player::named("griefer"), Some("Be nice".to_string()))
        .await
        .unwrap();

    let (request, _peer) = server.await.unwrap();
    assert_eq!(request.method, "minecraft:players/kick");
    assert_eq!(
        request.params,
        Some(json!([{"player": {"name": "griefer"}, "reason": "Be nice"}]))
    );
}

#[tokio::test]
async fn test_server_settings_paths() {
    let (mgmt, peer) = setup().await;
    let server = tokio::spawn(async move {
        let mut peer = peer;
        let get = peer.recv_request().await.unwrap();
        peer.respond(&Response::success(get.id, json!(20))).unwrap();
        let set = peer.recv_request().await.unwrap();
        peer.respond(&Response::success(set.id, json!(40))).unwrap();
        (get, set, peer)
    });

    assert_eq!(mgmt.setting("max_players").await.unwrap(), json!(20));
    assert_eq!(mgmt.set_setting("max_players", &40).await.unwrap(), json!(40));

    let (get, set, _peer) = server.await.unwrap();
    assert_eq!(get.method, "minecraft:serversettings/max_players");
    assert!(get.params.is_none());
    assert_eq!(set.method, "minecraft:serversettings/max_players/set");
    assert_eq!(set.params, Some(json!([{"value": 40}])));
}

#[tokio::test]
async fn test_server_error_is_typed() {
    let (mgmt, mut peer) = setup().await;
    let server = tokio::spawn(async move {
        let request = peer.recv_request().await.unwrap();
        peer.respond(&Response::failure(request.id, -32602, "Invalid params"))
            .unwrap();
        peer
    });

    match mgmt.players().await {
        Err(MsmpError::Server(error)) => assert_eq!(error.code, -32602),
        other => panic!("Expected server error, got {:?}", other),
    }

    let _peer = server.await.unwrap();
}

#[tokio::test]
async fn test_unexpected_result_shape_is_serialization_error() {
    let (mgmt, peer) = setup().await;
    let server = answer_once(peer, json!("not a list"));

    assert!(matches!(
        mgmt.players().await,
        Err(MsmpError::Serialization(_))
    ));

    let _ = server.await.unwrap();
}
