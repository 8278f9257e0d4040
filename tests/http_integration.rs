// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Integration tests for the REST side using wiremock.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use smarthq_lib::codec::DecodedValue;
use smarthq_lib::discovery::discover;
use smarthq_lib::erd::Erd;
use smarthq_lib::error::{CommunicationError, EncodeError, Error};
use smarthq_lib::event::EventBus;
use smarthq_lib::manager::{BridgeConfig, DeviceOverride, ReconnectionPolicy};
use smarthq_lib::protocol::{HttpConfig, ResourceClient};
use smarthq_lib::push::ChannelState;
use smarthq_lib::scheduler::{PollSettings, ReconciliationScheduler};
use smarthq_lib::state::{DeviceMirror, UpdateSource};
use smarthq_lib::types::{ApplianceId, ApplianceType, Temperature};
use smarthq_lib::SmartHqBridge;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client(server: &MockServer) -> ResourceClient {
    HttpConfig::new(server.uri())
        .with_token("token-1")
        .with_timeout(Duration::from_secs(5))
        .into_client()
        .unwrap()
}

fn erd_body(value: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "kind": "appliance#erdListEntry",
        "value": value
    }))
}

async fn mount_erd(server: &MockServer, appliance: &str, code: &str, value: &str) {
    Mock::given(method("GET"))
        .and(path(format!("/appliance/{appliance}/erd/{code}")))
        .respond_with(erd_body(value))
        .mount(server)
        .await;
}

// ============================================================================
// ResourceClient Tests
// ============================================================================

mod resource_client {
    use super::*;

    #[tokio::test]
    async fn read_erd_sends_bearer_token() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/appliance/D828C9D1/erd/0x1016"))
            .and(header("authorization", "Bearer token-1"))
            .respond_with(erd_body("01"))
            .expect(1)
            .mount(&server)
            .await;

        let raw = client(&server)
            .read_erd(&ApplianceId::from("D828C9D1"), Erd::DoorStatus)
            .await
            .unwrap();
        assert_eq!(raw, "01");
    }

    #[tokio::test]
    async fn set_token_applies_to_later_requests() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/appliance/A1/erd/0x1016"))
            .and(header("authorization", "Bearer token-2"))
            .respond_with(erd_body("00"))
            .mount(&server)
            .await;

        let client = client(&server);
        client.set_token("token-2");

        let raw = client
            .read_erd(&ApplianceId::from("A1"), Erd::DoorStatus)
            .await
            .unwrap();
        assert_eq!(raw, "00");
    }

    #[tokio::test]
    async fn write_erd_posts_list_entry() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/appliance/A1/erd/0x5111"))
            .and(body_json(json!({
                "kind": "appliance#erdListEntry",
                "userId": "user-9",
                "applianceId": "A1",
                "erd": "0x5111",
                "value": "01"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .expect(1)
            .mount(&server)
            .await;

        client(&server)
            .write_erd("user-9", &ApplianceId::from("A1"), Erd::UpperOvenLight, "01")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn unauthorized_is_reported() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let err = client(&server)
            .read_erd(&ApplianceId::from("A1"), Erd::DoorStatus)
            .await
            .unwrap_err();
        assert!(matches!(err, CommunicationError::Unauthorized { .. }));
        assert!(err.is_service_unavailable());
    }

    #[tokio::test]
    async fn server_error_carries_status_and_context() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let err = client(&server)
            .read_erd(&ApplianceId::from("A1"), Erd::DoorStatus)
            .await
            .unwrap_err();
        match &err {
            CommunicationError::Status { status, body, .. } => {
                assert_eq!(*status, 500);
                assert_eq!(body, "boom");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(err.to_string().starts_with("appliance A1 erd 0x1016"));
    }

    #[tokio::test]
    async fn slow_response_times_out() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(erd_body("01").set_delay(Duration::from_secs(3)))
            .mount(&server)
            .await;

        let client = HttpConfig::new(server.uri())
            .with_timeout(Duration::from_millis(200))
            .into_client()
            .unwrap();

        let err = client
            .read_erd(&ApplianceId::from("A1"), Erd::DoorStatus)
            .await
            .unwrap_err();
        assert!(err.is_timeout());
    }

    #[tokio::test]
    async fn websocket_endpoint_is_parsed() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/websocket"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "kind": "websocket#endpoint",
                "endpoint": "wss://ws.example.com/socket?token=abc"
            })))
            .mount(&server)
            .await;

        let url = client(&server).websocket_endpoint().await.unwrap();
        assert_eq!(url.scheme(), "wss");
        assert_eq!(url.host_str(), Some("ws.example.com"));
    }

    #[tokio::test]
    async fn invalid_json_is_invalid_response() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let err = client(&server).list_appliances().await.unwrap_err();
        assert!(matches!(err, CommunicationError::InvalidResponse { .. }));
    }
}

// ============================================================================
// Discovery Tests
// ============================================================================

mod discovery {
    use super::*;

    async fn mount_appliance(
        server: &MockServer,
        id: &str,
        details: serde_json::Value,
        features: &[&str],
    ) {
        Mock::given(method("GET"))
            .and(path(format!("/appliance/{id}")))
            .respond_with(ResponseTemplate::new(200).set_body_json(details))
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path(format!("/appliance/{id}/feature")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "applianceId": id,
                "features": features
            })))
            .mount(server)
            .await;
    }

    async fn mount_listing(server: &MockServer) {
        Mock::given(method("GET"))
            .and(path("/appliance"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "kind": "appliance#applianceList",
                "userId": "user-9",
                "items": [
                    { "applianceId": "OVEN1", "type": "Oven", "nickname": "Kitchen Oven!" },
                    { "applianceId": "FRIDGE1", "type": "Refrigerator", "nickname": "Fridge" },
                    { "applianceId": "DW1", "type": "Dishwasher", "nickname": "Dishes" }
                ]
            })))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn merges_details_and_features() {
        let server = MockServer::start().await;
        mount_listing(&server).await;
        mount_appliance(
            &server,
            "OVEN1",
            json!({ "brand": "Cafe", "model": "CTS70DP2N", "serial": "SN1", "firmware": "V1.2.3-beta" }),
            &["COOKING_V1_UPPER_OVEN_FOUNDATION"],
        )
        .await;
        mount_appliance(&server, "FRIDGE1", json!({}), &["DOOR_STATUS"]).await;
        mount_appliance(&server, "DW1", json!({}), &["DISHWASHER_V1_FOUNDATION"]).await;

        let discovery = discover(&client(&server), &BridgeConfig::default())
            .await
            .unwrap();

        assert_eq!(discovery.user_id, "user-9");
        assert_eq!(discovery.appliances.len(), 3);

        let oven = &discovery.appliances[0];
        assert_eq!(oven.id, ApplianceId::from("OVEN1"));
        assert_eq!(oven.appliance_type, ApplianceType::Oven);
        assert_eq!(oven.nickname, "Kitchen Oven");
        assert_eq!(oven.model.as_deref(), Some("CTS70DP2N"));
        assert_eq!(oven.firmware.as_str(), "1.2.3");
        assert!(oven.features.contains("COOKING_V1_UPPER_OVEN_FOUNDATION"));
        assert_eq!(oven.user_id, "user-9");

        let fridge = &discovery.appliances[1];
        assert_eq!(fridge.firmware.as_str(), "0.0.0");
    }

    #[tokio::test]
    async fn hidden_and_failing_appliances_are_skipped() {
        let server = MockServer::start().await;
        mount_listing(&server).await;
        mount_appliance(&server, "OVEN1", json!({}), &[]).await;
        mount_appliance(&server, "DW1", json!({}), &[]).await;
        // FRIDGE1 details fail
        Mock::given(method("GET"))
            .and(path("/appliance/FRIDGE1"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/appliance/FRIDGE1/feature"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "features": [] })))
            .mount(&server)
            .await;

        let config = BridgeConfig::default().with_device(DeviceOverride::new("DW1").hidden());
        let discovery = discover(&client(&server), &config).await.unwrap();

        let ids: Vec<_> = discovery.appliances.iter().map(|a| a.id.clone()).collect();
        assert_eq!(ids, vec![ApplianceId::from("OVEN1")]);
    }

    #[tokio::test]
    async fn invalid_characters_can_be_kept() {
        let server = MockServer::start().await;
        mount_listing(&server).await;
        mount_appliance(&server, "OVEN1", json!({}), &[]).await;
        mount_appliance(&server, "FRIDGE1", json!({}), &[]).await;
        mount_appliance(&server, "DW1", json!({ "firmware": "V9.9" }), &[]).await;

        let mut config =
            BridgeConfig::default().with_device(DeviceOverride::new("DW1").with_firmware("V2-rc1"));
        config.options.allow_invalid_characters = true;

        let discovery = discover(&client(&server), &config).await.unwrap();
        assert_eq!(discovery.appliances[0].nickname, "Kitchen Oven!");
        // The override wins over the reported firmware
        assert_eq!(discovery.appliances[2].firmware.as_str(), "2");
    }

    #[tokio::test]
    async fn listing_failure_fails_discovery() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/appliance"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let err = discover(&client(&server), &BridgeConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err.source, CommunicationError::Status { status: 500, .. }));
    }
}

// ============================================================================
// Reconciliation Tests
// ============================================================================

mod reconciliation {
    use super::*;

    #[tokio::test]
    async fn partial_failure_keeps_successful_reads() {
        let server = MockServer::start().await;
        mount_erd(&server, "OVEN1", "0x5111", "01").await;
        mount_erd(&server, "OVEN1", "0x5100", "020190").await;
        Mock::given(method("GET"))
            .and(path("/appliance/OVEN1/erd/0x0001"))
            .respond_with(ResponseTemplate::new(503))
            .expect(2)
            .mount(&server)
            .await;

        let mirror = Arc::new(DeviceMirror::new(EventBus::new()));
        let scheduler = ReconciliationScheduler::new(
            Arc::new(client(&server)),
            Arc::clone(&mirror),
            PollSettings::default(),
        );
        let id = ApplianceId::from("OVEN1");
        scheduler.register(
            id.clone(),
            vec![Erd::UpperOvenLight, Erd::UpperOvenCookMode, Erd::ModelNumber],
            Duration::from_secs(3600),
        );

        let report = scheduler.run_cycle(&id).await.unwrap();
        assert_eq!(report.applied, 2);
        assert_eq!(report.failed, 1);

        let light = mirror.get(&id, Erd::UpperOvenLight).unwrap();
        assert_eq!(light.value, DecodedValue::Flag(true));
        assert_eq!(light.source, UpdateSource::Poll);

        let cook = mirror.get(&id, Erd::UpperOvenCookMode).unwrap();
        let target = cook.value.as_temperature().unwrap();
        assert_eq!(target.to_fahrenheit(), Some(400));

        assert!(mirror.get(&id, Erd::ModelNumber).is_none());
        scheduler.shutdown();
    }
}

// ============================================================================
// Bridge Tests
// ============================================================================

mod bridge {
    use super::*;

    async fn start_bridge(server: &MockServer) -> SmartHqBridge {
        Mock::given(method("GET"))
            .and(path("/appliance"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "userId": "user-9",
                "items": [
                    { "applianceId": "OVEN1", "type": "Oven", "nickname": "Oven" },
                    { "applianceId": "FRIDGE1", "type": "Refrigerator", "nickname": "Fridge" }
                ]
            })))
            .mount(server)
            .await;
        for (id, features) in [
            (
                "OVEN1",
                json!([
                    "COOKING_V1_UPPER_OVEN_FOUNDATION",
                    "COOKING_V1_EXTENDED_COOKTOP_FOUNDATION"
                ]),
            ),
            ("FRIDGE1", json!(["DOOR_STATUS"])),
        ] {
            Mock::given(method("GET"))
                .and(path(format!("/appliance/{id}")))
                .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
                .mount(server)
                .await;
            Mock::given(method("GET"))
                .and(path(format!("/appliance/{id}/feature")))
                .respond_with(
                    ResponseTemplate::new(200).set_body_json(json!({ "features": features })),
                )
                .mount(server)
                .await;
        }
        mount_erd(server, "OVEN1", "0x5111", "00").await;
        mount_erd(server, "FRIDGE1", "0x1016", "00").await;
        Mock::given(method("GET"))
            .and(path("/websocket"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                // Nothing listens here; the channel keeps retrying in the background
                "endpoint": "ws://127.0.0.1:9/"
            })))
            .mount(server)
            .await;

        let config = BridgeConfig::default()
            .with_api_url(server.uri())
            .with_reconnection(ReconnectionPolicy::new().with_initial_delay(Duration::from_secs(30)));
        let bridge = SmartHqBridge::new(config, "token-1").unwrap();
        bridge.start().await.unwrap();
        bridge
    }

    #[tokio::test]
    async fn restarts_after_shutdown() {
        let server = MockServer::start().await;
        let bridge = start_bridge(&server).await;
        let fridge = ApplianceId::from("FRIDGE1");
        let first = bridge.get(&fridge, Erd::DoorStatus).unwrap().sequence;

        bridge.shutdown().await;
        assert_eq!(bridge.channel_state(), ChannelState::Disconnected);

        bridge.start().await.unwrap();
        let second = bridge.get(&fridge, Erd::DoorStatus).unwrap().sequence;
        assert!(second > first);
        assert_eq!(bridge.appliances().len(), 2);

        bridge.shutdown().await;
    }

    #[tokio::test]
    async fn start_runs_initial_refresh() {
        let server = MockServer::start().await;
        mount_erd(&server, "OVEN1", "0x5100", "000000").await;
        let bridge = start_bridge(&server).await;

        assert_eq!(bridge.user_id().as_deref(), Some("user-9"));
        assert_eq!(bridge.appliances().len(), 2);

        let door = bridge
            .get(&ApplianceId::from("FRIDGE1"), Erd::DoorStatus)
            .unwrap();
        assert_eq!(door.value, DecodedValue::Flag(false));
        assert_eq!(door.source, UpdateSource::Poll);

        bridge.shutdown().await;
    }

    #[tokio::test]
    async fn set_writes_and_records_optimistically() {
        let server = MockServer::start().await;
        mount_erd(&server, "OVEN1", "0x5100", "000000").await;
        Mock::given(method("POST"))
            .and(path("/appliance/OVEN1/erd/0x5111"))
            .and(body_json(json!({
                "kind": "appliance#erdListEntry",
                "userId": "user-9",
                "applianceId": "OVEN1",
                "erd": "0x5111",
                "value": "01"
            })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;
        let bridge = start_bridge(&server).await;
        let oven = ApplianceId::from("OVEN1");

        let entry = bridge
            .set(&oven, Erd::UpperOvenLight, DecodedValue::Flag(true))
            .await
            .unwrap();
        assert_eq!(entry.source, UpdateSource::OptimisticWrite);
        assert_eq!(
            bridge.get(&oven, Erd::UpperOvenLight).unwrap().value,
            DecodedValue::Flag(true)
        );

        bridge.shutdown().await;
    }

    #[tokio::test]
    async fn cook_mode_write_preserves_fresh_record() {
        let server = MockServer::start().await;
        // Remote record: mode 0xAA, 150 F, trailing byte 0xFF
        mount_erd(&server, "OVEN1", "0x5100", "aa0096ff").await;
        Mock::given(method("POST"))
            .and(path("/appliance/OVEN1/erd/0x5100"))
            .and(body_json(json!({
                "kind": "appliance#erdListEntry",
                "userId": "user-9",
                "applianceId": "OVEN1",
                "erd": "0x5100",
                "value": "aa0188ff"
            })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;
        let bridge = start_bridge(&server).await;

        let entry = bridge
            .set(
                &ApplianceId::from("OVEN1"),
                Erd::UpperOvenCookMode,
                DecodedValue::Temperature(Temperature::from_celsius(200.0)),
            )
            .await
            .unwrap();
        assert_eq!(entry.raw, "aa0188ff");

        bridge.shutdown().await;
    }

    #[tokio::test]
    async fn read_only_binding_rejects_writes() {
        let server = MockServer::start().await;
        mount_erd(&server, "OVEN1", "0x5100", "000000").await;
        let bridge = start_bridge(&server).await;

        let err = bridge
            .set(
                &ApplianceId::from("FRIDGE1"),
                Erd::DoorStatus,
                DecodedValue::Flag(true),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Encode(EncodeError::ReadOnly { .. })));

        bridge.shutdown().await;
    }

    #[tokio::test]
    async fn write_failure_leaves_mirror_untouched() {
        let server = MockServer::start().await;
        mount_erd(&server, "OVEN1", "0x5100", "000000").await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;
        let bridge = start_bridge(&server).await;
        let oven = ApplianceId::from("OVEN1");

        let err = bridge
            .set(&oven, Erd::UpperOvenLight, DecodedValue::Flag(true))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Communication(_)));
        assert_eq!(
            bridge.get(&oven, Erd::UpperOvenLight).unwrap().value,
            DecodedValue::Flag(false)
        );

        bridge.shutdown().await;
    }

    #[tokio::test]
    async fn set_before_start_is_rejected() {
        let bridge = SmartHqBridge::new(BridgeConfig::default(), "token").unwrap();
        let err = bridge
            .set(&"OVEN1".into(), Erd::UpperOvenLight, DecodedValue::Flag(true))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotStarted));
    }
}
