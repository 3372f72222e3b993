//! Integration tests for ModuleLifecycle against the in-memory transport.

mod common;

use async_trait::async_trait;
use common::{settle, test_environment, Harness, TestHooks};
use gateway_core::lifecycle::capability;
use gateway_core::{
    ClientEvent, ConnectionState, GatewayError, HealthState, LifecycleConfig, ModuleClient,
    ModuleLifecycle, TransportConnector,
};
use serde_json::json;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

#[tokio::test(start_paused = true)]
async fn test_start_reports_ready_module() {
    let harness = Harness::new();
    let started = Instant::now();

    harness.lifecycle.start().await.unwrap();

    // settle delay only, no backoff
    assert_eq!(started.elapsed(), Duration::from_secs(15));
    assert_eq!(
        harness.lifecycle.connection_state().await,
        ConnectionState::Connected
    );
    assert_eq!(harness.hooks.ready_calls.load(Ordering::SeqCst), 1);
    assert!(harness
        .hub
        .registered_methods()
        .contains(&capability::CM_RESTART_GATEWAY_MODULE.to_string()));
    assert!(harness
        .hub
        .registered_methods()
        .contains(&"restart-gateway-module".to_string()));

    let reported = harness.hub.reported_patches();
    let host = reported
        .iter()
        .find(|patch| patch.get("hostname").is_some())
        .expect("device properties reported");
    assert_eq!(host["platform"], std::env::consts::OS);

    let sent = harness.hub.sent_messages();
    let started_event = sent
        .iter()
        .find(|s| s.message.body_json().unwrap().get("evModuleStarted").is_some())
        .expect("started event sent");
    assert_eq!(started_event.output_name.as_deref(), Some("iotc"));
    assert_eq!(
        started_event.message.body_json().unwrap(),
        json!({
            "stIoTCentralClientState": "connected",
            "stModuleState": "active",
            "evModuleStarted": "Module initialization"
        })
    );
}

#[tokio::test(start_paused = true)]
async fn test_connect_gives_up_after_three_attempts() {
    let harness = Harness::new();
    harness.hub.fail_next_connects(10);
    let started = Instant::now();

    let result = harness.lifecycle.start().await;

    assert!(matches!(
        result,
        Err(GatewayError::ConnectExhausted { attempts: 3 })
    ));
    // two backoffs, none after the last attempt
    assert_eq!(started.elapsed(), Duration::from_secs(10));
    assert_eq!(
        harness.lifecycle.connection_state().await,
        ConnectionState::Disconnected
    );
    assert_eq!(harness.hooks.ready_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn test_failed_open_closes_each_client() {
    let harness = Harness::new();
    harness.hub.fail_next_opens(10);
    let started = Instant::now();

    assert!(harness.lifecycle.start().await.is_err());

    // settle delay before every open, backoff between attempts
    assert_eq!(started.elapsed(), Duration::from_secs(3 * 15 + 2 * 5));
    assert_eq!(harness.hub.clients_created(), 3);
    assert_eq!(harness.hub.clients_closed(), 3);
    assert!(!harness.lifecycle.is_connected().await);
}

/// Connector whose client can never be built from the environment.
struct MisconfiguredConnector {
    attempts: AtomicU32,
}

#[async_trait]
impl TransportConnector for MisconfiguredConnector {
    async fn create_client(&self) -> gateway_core::Result<Arc<dyn ModuleClient>> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(GatewayError::Config {
            message: "missing IOTEDGE_WORKLOADURI".into(),
        })
    }
}

#[tokio::test(start_paused = true)]
async fn test_config_error_is_not_retried() {
    let connector = Arc::new(MisconfiguredConnector {
        attempts: AtomicU32::new(0),
    });
    let lifecycle = ModuleLifecycle::builder(connector.clone(), Arc::new(TestHooks::default()))
        .environment(test_environment())
        .exit_handler(|_| {})
        .build()
        .unwrap();
    let started = Instant::now();

    let result = lifecycle.start().await;

    assert!(matches!(result, Err(GatewayError::Config { .. })));
    assert_eq!(connector.attempts.load(Ordering::SeqCst), 1);
    assert_eq!(started.elapsed(), Duration::ZERO);
}

#[tokio::test(start_paused = true)]
async fn test_connect_succeeds_on_last_attempt() {
    let harness = Harness::new();
    harness.hub.fail_next_connects(2);
    let started = Instant::now();

    harness.lifecycle.start().await.unwrap();

    assert_eq!(started.elapsed(), Duration::from_secs(25));
    assert_eq!(harness.hub.clients_created(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_unknown_direct_method_answers_400() {
    let harness = Harness::started().await;

    let response = harness
        .hub
        .call_method("doStuff", json!({}))
        .await
        .expect("response");

    assert_eq!(response.status, 400);
    assert!(response.payload["message"]
        .as_str()
        .unwrap()
        .contains("doStuff"));
}

#[tokio::test(start_paused = true)]
async fn test_restart_command_answers_then_exits() {
    let harness = Harness::started().await;

    let response = harness
        .hub
        .call_method(capability::CM_RESTART_GATEWAY_MODULE, json!({"timeout": 2}))
        .await
        .expect("response");
    assert_eq!(response.status, 200);
    assert_eq!(response.payload["message"], "Restart module request received");

    tokio::time::sleep(Duration::from_secs(6)).await;
    assert_eq!(harness.exit_count(), 0);

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(harness.exit_count(), 1);

    let stopped = harness.bodies_with(capability::EV_MODULE_STOPPED);
    assert_eq!(stopped.len(), 1);
    assert_eq!(stopped[0]["evModuleRestart"], "RestartModule command received");
    assert_eq!(stopped[0]["stModuleState"], "inactive");
}

#[tokio::test(start_paused = true)]
async fn test_plain_restart_name_defaults_to_no_delay() {
    let harness = Harness::started().await;

    let response = harness
        .hub
        .call_method("restart-gateway-module", json!({}))
        .await
        .expect("response");
    assert_eq!(response.status, 200);

    // grace period only
    tokio::time::sleep(Duration::from_secs(4)).await;
    assert_eq!(harness.exit_count(), 0);
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(harness.exit_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_restart_command_rejects_bad_timeout() {
    let harness = Harness::started().await;

    let response = harness
        .hub
        .call_method(
            capability::CM_RESTART_GATEWAY_MODULE,
            json!({"timeout": "later"}),
        )
        .await
        .expect("response");

    assert_eq!(response.status, 400);
    assert!(!harness.lifecycle.is_restart_pending());
}

#[tokio::test(start_paused = true)]
async fn test_health_threshold_triggers_single_restart() {
    let harness = Harness::started().await;
    harness.hooks.set_health(HealthState::Warning);

    for _ in 0..2 {
        assert_eq!(harness.lifecycle.get_health().await, HealthState::Warning);
    }
    assert!(!harness.lifecycle.is_restart_pending());

    // third bad result reaches the default threshold of 3
    harness.lifecycle.get_health().await;
    assert!(harness.lifecycle.is_restart_pending());

    // still bad, but the restart is already underway
    harness.lifecycle.get_health().await;

    tokio::time::sleep(Duration::from_secs(6)).await;
    assert_eq!(harness.exit_count(), 1);
    assert_eq!(harness.bodies_with(capability::EV_MODULE_STOPPED).len(), 1);

    // only the first evaluation ran, later calls reuse the bad state
    let heartbeats = harness.bodies_with(capability::TL_SYSTEM_HEARTBEAT);
    assert_eq!(heartbeats.len(), 1);
    assert_eq!(heartbeats[0]["tlSystemHeartbeat"], 1);
}

#[tokio::test(start_paused = true)]
async fn test_healthy_module_sends_heartbeat_each_check() {
    let harness = Harness::started().await;

    assert_eq!(harness.lifecycle.get_health().await, HealthState::Good);
    assert_eq!(harness.lifecycle.get_health().await, HealthState::Good);

    assert_eq!(harness.bodies_with(capability::TL_SYSTEM_HEARTBEAT).len(), 2);
    assert!(!harness.lifecycle.is_restart_pending());
}

#[tokio::test(start_paused = true)]
async fn test_health_threshold_is_configurable() {
    let harness = Harness::with_config(LifecycleConfig::default().with_health_check_retries(1));
    harness.lifecycle.start().await.unwrap();
    harness.hooks.set_health(HealthState::Critical);

    harness.lifecycle.get_health().await;
    assert!(harness.lifecycle.is_restart_pending());
}

#[tokio::test(start_paused = true)]
async fn test_health_monitor_runs_periodically() {
    let harness = Harness::started().await;
    let monitor = harness
        .lifecycle
        .spawn_health_monitor(Duration::from_secs(15));

    tokio::time::sleep(Duration::from_secs(46)).await;
    monitor.abort();

    assert_eq!(harness.bodies_with(capability::TL_SYSTEM_HEARTBEAT).len(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_desired_properties_are_acknowledged() {
    let harness = Harness::started().await;
    assert!(!harness.lifecycle.debug_telemetry().await);

    assert!(harness
        .hub
        .push_desired(json!({"wpDebugTelemetry": true, "wpUnknown": 1, "$version": 4})));
    settle().await;

    assert!(harness.lifecycle.debug_telemetry().await);
    let last = harness.hub.reported_patches().pop().unwrap();
    assert_eq!(
        last,
        json!({"wpDebugTelemetry": {"value": true, "ac": 200, "ad": "completed", "av": 4}})
    );
    // initial document plus the patch
    assert_eq!(harness.hooks.desired_seen.lock().unwrap().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_client_error_drops_connection() {
    let harness = Harness::started().await;
    let sent_before = harness.hub.sent_messages().len();

    assert!(harness
        .hub
        .emit(ClientEvent::Error("socket hang up".to_string())));
    settle().await;

    assert_eq!(
        harness.lifecycle.connection_state().await,
        ConnectionState::Disconnected
    );
    assert_eq!(
        *harness.hooks.client_errors.lock().unwrap(),
        vec!["socket hang up".to_string()]
    );

    harness
        .lifecycle
        .send_measurement(&json!({"tlFreeMemory": 1}), Some("iotc"))
        .await;
    assert_eq!(harness.hub.sent_messages().len(), sent_before);

    let response = harness
        .lifecycle
        .invoke_direct_method("ompadapter", "ReadValues_v1", json!({}), None, None)
        .await;
    assert_eq!(response.status, 500);
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_replaces_previous_client() {
    let harness = Harness::started().await;

    harness.lifecycle.connect().await.unwrap();
    settle().await;

    assert_eq!(harness.hub.clients_created(), 2);
    assert_eq!(harness.hub.clients_closed(), 1);

    let seen_before = harness.hooks.desired_seen.lock().unwrap().len();
    harness.hub.push_desired(json!({"$version": 9}));
    settle().await;
    assert_eq!(
        harness.hooks.desired_seen.lock().unwrap().len(),
        seen_before + 1
    );

    // handlers carry over to the new client
    let response = harness
        .hub
        .call_method("doStuff", json!(null))
        .await
        .expect("response");
    assert_eq!(response.status, 400);
}

#[tokio::test(start_paused = true)]
async fn test_invoke_direct_method_passes_timeouts() {
    let harness = Harness::started().await;
    harness.hub.set_invoke_handler(|_, params| {
        Ok(gateway_core::MethodResponse::new(
            200,
            json!({"echo": params.method_name}),
        ))
    });

    let response = harness
        .lifecycle
        .invoke_direct_method(
            "ompadapter",
            "TestConnection_v1",
            json!({"opcEndpoint": {"uri": "opc.tcp://plc:4840"}}),
            Some(10),
            Some(10),
        )
        .await;

    assert_eq!(response.status, 200);
    assert_eq!(response.payload["echo"], "TestConnection_v1");

    let (module_id, params) = harness.hub.invocations().pop().unwrap();
    assert_eq!(module_id, "ompadapter");
    assert_eq!(params.connect_timeout_secs, Some(10));
    assert_eq!(params.response_timeout_secs, Some(10));
}

#[tokio::test(start_paused = true)]
async fn test_invoke_transport_error_becomes_500() {
    let harness = Harness::started().await;
    harness
        .hub
        .set_invoke_handler(|_, _| Err(GatewayError::transport("timeout waiting for module")));

    let response = harness
        .lifecycle
        .invoke_direct_method("ompadapter", "BrowseNodes_v1", json!({}), None, None)
        .await;

    assert_eq!(response.status, 500);
}

#[tokio::test]
async fn test_invoke_without_client_returns_500() {
    let harness = Harness::new();

    let response = harness
        .lifecycle
        .invoke_direct_method("ompadapter", "GetAllAssets_v1", json!([]), None, None)
        .await;

    assert_eq!(response.status, 500);
    assert_eq!(harness.hub.invocations().len(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_close_detaches_client() {
    let harness = Harness::started().await;

    harness.lifecycle.close().await;

    assert_eq!(
        harness.lifecycle.connection_state().await,
        ConnectionState::Disconnected
    );
    assert_eq!(harness.hub.clients_closed(), 1);
    assert!(!harness.hub.emit(ClientEvent::Connected));
}
