use fleetmon_devkit::responses;
use fleetmon_devkit::TestHarness;
use fleetmon_kernel::topology::SiteSettings;
use fleetmon_kernel::{ErrorLog, TopologyError};
use serde_json::json;

#[tokio::test]
async fn test_add_instances_broadcasts_to_every_host() {
    let harness = TestHarness::new();
    let mut log = ErrorLog::new();

    harness
        .node
        .add_instances(vec![TestHarness::instance_config("AppX", 3, "h3", 2001)], &mut log)
        .await
        .unwrap();

    TestHarness::assert_no_errors(&log).unwrap();
    harness.assert_contacted(&["h1", "h2", "h3"]).unwrap();

    let body = harness.last_body("h2", "updateWotaskd").unwrap();
    let add = &body["add"];
    assert_eq!(add.as_object().unwrap().len(), 1, "only instanceArray is sent");
    assert_eq!(add["instanceArray"][0]["hostName"], json!("h3"));
    assert_eq!(add["instanceArray"][0]["id"], json!(3));
    assert!(add["instanceArray"][0].get("runningState").is_none());

    let site = harness.node.snapshot().await;
    assert_eq!(site.instances().len(), 4);
}

#[tokio::test]
async fn test_add_instances_is_all_or_nothing() {
    let harness = TestHarness::new();
    let mut log = ErrorLog::new();

    let result = harness
        .node
        .add_instances(
            vec![
                TestHarness::instance_config("AppX", 3, "h3", 2001),
                TestHarness::instance_config("AppZ", 1, "h3", 4001),
            ],
            &mut log,
        )
        .await;

    assert_eq!(result, Err(TopologyError::UnknownApplication("AppZ".into())));
    assert!(harness.agent.requests().is_empty());
    assert_eq!(harness.node.snapshot().await.instances().len(), 3);
}

#[tokio::test]
async fn test_item_errors_reach_the_sink_and_edit_stays() {
    let harness = TestHarness::new();
    harness.agent.reply_json("h2", responses::update("add", "instanceArray", &[Some("port 2001 busy")]));
    harness.agent.unreachable("h3");
    let mut log = ErrorLog::new();

    harness
        .node
        .add_instances(vec![TestHarness::instance_config("AppX", 3, "h3", 2001)], &mut log)
        .await
        .unwrap();

    assert_eq!(
        log.errors(),
        [
            "port 2001 busy".to_string(),
            "INTERNAL ERROR: Response returned was null or empty".to_string()
        ]
    );
    // optimistic: the local edit is kept
    assert_eq!(harness.node.snapshot().await.instances().len(), 4);
}

#[tokio::test]
async fn test_remove_application_takes_its_instances() {
    let harness = TestHarness::new();
    let mut log = ErrorLog::new();

    harness.node.remove_application("AppX", &mut log).await.unwrap();

    let site = harness.node.snapshot().await;
    assert!(site.application_by_name("AppX").is_none());
    assert_eq!(site.instances().len(), 1);

    let body = harness.last_body("h1", "updateWotaskd").unwrap();
    assert_eq!(body["remove"]["applicationArray"][0]["name"], json!("AppX"));
    assert_eq!(body["remove"]["instanceArray"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_configure_application_alone_or_with_instances() {
    let harness = TestHarness::new();
    let mut log = ErrorLog::new();
    let mut config = TestHarness::application_config("AppX", 2001);
    config.additional_args = Some("-Xmx512m".into());

    harness.node.configure_application(config.clone(), &mut log).await.unwrap();
    let body = harness.last_body("h1", "updateWotaskd").unwrap();
    assert_eq!(body["configure"]["applicationArray"][0]["additionalArgs"], json!("-Xmx512m"));
    assert!(body["configure"].get("instanceArray").is_none());

    harness.node.configure_application_and_instances(config, &mut log).await.unwrap();
    let body = harness.last_body("h1", "updateWotaskd").unwrap();
    assert_eq!(body["configure"]["instanceArray"].as_array().unwrap().len(), 2);
    TestHarness::assert_no_errors(&log).unwrap();
}

#[tokio::test]
async fn test_add_host_includes_the_new_host() {
    let harness = TestHarness::new();
    let mut log = ErrorLog::new();

    harness.node.add_host(TestHarness::host_config("h4"), &mut log).await.unwrap();

    harness.assert_contacted(&["h1", "h2", "h3", "h4"]).unwrap();
    let body = harness.last_body("h4", "updateWotaskd").unwrap();
    assert_eq!(body["add"]["hostArray"][0]["name"], json!("h4"));
}

#[tokio::test]
async fn test_remove_host_in_use_is_refused() {
    let harness = TestHarness::new();
    let mut log = ErrorLog::new();

    let result = harness.node.remove_host("h1", &mut log).await;
    assert_eq!(result, Err(TopologyError::HostInUse("h1".into())));
    assert!(harness.agent.requests().is_empty());

    harness.node.remove_host("h3", &mut log).await.unwrap();
    harness.assert_contacted(&["h1", "h2", "h3"]).unwrap();
    let body = harness.last_body("h3", "updateWotaskd").unwrap();
    assert_eq!(body["remove"]["hostArray"][0]["name"], json!("h3"));
    assert!(harness.node.snapshot().await.host("h3").is_none());
}

#[tokio::test]
async fn test_configure_site_sends_settings() {
    let harness = TestHarness::new();
    let mut log = ErrorLog::new();
    let settings = SiteSettings {
        adaptor_url: Some("http://front/cgi-bin/apps".into()),
        view_refresh_enabled: false,
        view_refresh_rate: 15,
    };

    harness.node.configure_site(settings.clone(), &mut log).await;

    let body = harness.last_body("h2", "updateWotaskd").unwrap();
    assert_eq!(body["configure"]["site"]["viewRefreshRate"], json!(15));
    assert_eq!(harness.node.snapshot().await.settings(), &settings);
}

#[tokio::test]
async fn test_overwrite_and_clear_target_one_host() {
    let harness = TestHarness::new();
    harness.agent.reply_json("h2", responses::scalar_update("clear", Some("agent is locked")));
    let mut log = ErrorLog::new();

    harness.node.overwrite_host("h2", &mut log).await.unwrap();
    let body = harness.last_body("h2", "updateWotaskd").unwrap();
    assert_eq!(body["overwrite"]["SiteConfig"]["hosts"].as_array().unwrap().len(), 3);
    harness.assert_contacted(&["h2"]).unwrap();

    harness.node.clear_host("h2", &mut log).await.unwrap();
    assert_eq!(harness.last_body("h2", "updateWotaskd").unwrap(), json!({"clear": "SITE"}));
    assert_eq!(log.errors(), ["agent is locked".to_string()]);

    let missing = harness.node.clear_host("nope", &mut log).await;
    assert_eq!(missing, Err(TopologyError::UnknownHost("nope".into())));
}

#[tokio::test]
async fn test_remove_instances_broadcasts_removed_configs() {
    let harness = TestHarness::new();
    let mut log = ErrorLog::new();

    harness
        .node
        .remove_instances(&[TestHarness::key("AppX", 2)], &mut log)
        .await
        .unwrap();

    harness.assert_contacted(&["h1", "h2", "h3"]).unwrap();
    let body = harness.last_body("h3", "updateWotaskd").unwrap();
    let removed = body["remove"]["instanceArray"].as_array().unwrap();
    assert_eq!(removed.len(), 1);
    assert_eq!(removed[0]["hostName"], json!("h2"));
    assert_eq!(removed[0]["applicationName"], json!("AppX"));

    let site = harness.node.snapshot().await;
    assert_eq!(site.instances().len(), 2);
    assert!(site.instance(&TestHarness::key("AppX", 2)).is_none());
}

#[tokio::test]
async fn test_remove_instances_with_repeated_key_removes_once() {
    let harness = TestHarness::new();
    let mut log = ErrorLog::new();
    let x1 = TestHarness::key("AppX", 1);

    let result = harness.node.remove_instances(&[x1.clone(), x1.clone()], &mut log).await;

    assert_eq!(result, Ok(()));
    assert!(harness.node.snapshot().await.instance(&x1).is_none());
    harness.assert_contacted(&["h1", "h2", "h3"]).unwrap();
    let body = harness.last_body("h1", "updateWotaskd").unwrap();
    assert_eq!(body["remove"]["instanceArray"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_remove_instances_with_unknown_key_changes_nothing() {
    let harness = TestHarness::new();
    let mut log = ErrorLog::new();
    let mut unknown = TestHarness::key("AppX", 1);
    unknown.id = 9;

    let result = harness
        .node
        .remove_instances(&[TestHarness::key("AppX", 2), unknown.clone()], &mut log)
        .await;

    assert_eq!(result, Err(TopologyError::UnknownInstance(unknown.to_string())));
    assert!(harness.agent.requests().is_empty());
    let site = harness.node.snapshot().await;
    assert_eq!(site.instances().len(), 3);
    assert!(site.instance(&TestHarness::key("AppX", 2)).is_some());
}

#[tokio::test]
async fn test_configure_instances_sends_new_values() {
    let harness = TestHarness::new();
    let mut log = ErrorLog::new();
    let mut config = TestHarness::instance_config("AppX", 1, "h1", 2001);
    config.additional_args = Some("-WOAutoOpenInBrowser NO".into());
    config.scheduling_enabled = true;

    harness
        .node
        .configure_instances(vec![config.clone(), config], &mut log)
        .await
        .unwrap();

    TestHarness::assert_no_errors(&log).unwrap();
    harness.assert_contacted(&["h1", "h2", "h3"]).unwrap();
    let body = harness.last_body("h2", "updateWotaskd").unwrap();
    let configured = body["configure"]["instanceArray"].as_array().unwrap();
    assert_eq!(configured.len(), 1);
    assert_eq!(configured[0]["additionalArgs"], json!("-WOAutoOpenInBrowser NO"));
    assert_eq!(configured[0]["schedulingEnabled"], json!(true));

    let site = harness.node.snapshot().await;
    assert!(site.instance(&TestHarness::key("AppX", 1)).unwrap().config.scheduling_enabled);
}

#[tokio::test]
async fn test_configure_instances_with_unknown_key_changes_nothing() {
    let harness = TestHarness::new();
    let mut log = ErrorLog::new();
    let mut known = TestHarness::instance_config("AppX", 1, "h1", 2001);
    known.auto_recover = false;
    let unknown = TestHarness::instance_config("AppX", 7, "h3", 2001);

    let result = harness.node.configure_instances(vec![known, unknown.clone()], &mut log).await;

    assert_eq!(result, Err(TopologyError::UnknownInstance(unknown.key().to_string())));
    assert!(harness.agent.requests().is_empty());
    let site = harness.node.snapshot().await;
    assert!(site.instance(&TestHarness::key("AppX", 1)).unwrap().config.auto_recover);
}

#[tokio::test]
async fn test_configure_host_sends_host_array() {
    let harness = TestHarness::new();
    let mut log = ErrorLog::new();
    let mut config = TestHarness::host_config("h2");
    config.port = 2085;

    harness.node.configure_host(config, &mut log).await.unwrap();

    harness.assert_contacted(&["h1", "h2", "h3"]).unwrap();
    let body = harness.last_body("h1", "updateWotaskd").unwrap();
    assert_eq!(body["configure"].as_object().unwrap().len(), 1);
    assert_eq!(body["configure"]["hostArray"][0]["name"], json!("h2"));
    assert_eq!(body["configure"]["hostArray"][0]["port"], json!(2085));
    // the agent of h2 is now reached on its new port
    assert_eq!(harness.last_request("h2").unwrap().host.port, 2085);
}

#[tokio::test]
async fn test_configure_unknown_host_changes_nothing() {
    let harness = TestHarness::new();
    let mut log = ErrorLog::new();

    let result = harness.node.configure_host(TestHarness::host_config("h9"), &mut log).await;

    assert_eq!(result, Err(TopologyError::UnknownHost("h9".into())));
    assert!(harness.agent.requests().is_empty());
    assert!(harness.node.snapshot().await.host("h9").is_none());
}
