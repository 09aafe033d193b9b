mod common;

use common::{app_state, nch, printed_events, written};
use nch_wifi_controller_lib::console::{self, ConsoleRequest, Task};
use nch_wifi_controller_lib::core::bluetooth::{DeviceDescriptor, WifiState};

fn request(task: Task, device: &str, retries: u32) -> ConsoleRequest {
    ConsoleRequest {
        task,
        device: Some(device.to_string()),
        retries,
    }
}

fn nch_42(is_paired: bool) -> Vec<DeviceDescriptor> {
    vec![
        DeviceDescriptor::new("00:11:22:33:44:42", "NCH-42", is_paired),
        DeviceDescriptor::new("00:11:22:33:44:99", "Magic Keyboard", false),
    ]
}

#[tokio::test]
async fn enables_wifi_on_a_newly_paired_nch() {
    let nch = nch(false);
    let (state, mut events) = app_state(nch_42(false), &nch);
    let mut output = Vec::new();

    let result = console::run(&state, &mut events, &request(Task::Enable, "NCH-42", 0), &mut output)
        .await
        .unwrap();

    assert_eq!(result, Some(WifiState::On));
    assert_eq!(written(&nch), vec!["Get_Wifi", "Wifi_Enable"]);
    assert_eq!(
        printed_events(&output),
        vec![
            "scan_started",
            "device_added",
            "scan_complete",
            "pairing_started",
            "paired",
            "connected",
            "wifi_state_changed",
            "wifi_state_changed",
            "disconnected",
        ]
    );
    assert!(state.bluetooth_manager.lock().await.session_state().is_none());
}

#[tokio::test]
async fn disables_wifi_on_a_paired_nch_by_address() {
    let nch = nch(true);
    let (state, mut events) = app_state(nch_42(true), &nch);
    let mut output = Vec::new();

    let result = console::run(
        &state,
        &mut events,
        &request(Task::Disable, "00:11:22:33:44:42", 0),
        &mut output,
    )
    .await
    .unwrap();

    assert_eq!(result, Some(WifiState::Off));
    assert_eq!(written(&nch), vec!["Get_Wifi", "Wifi_Disable"]);
    let printed = printed_events(&output);
    assert!(!printed.contains(&"pairing_started".to_string()));
    assert!(printed.contains(&"connected".to_string()));
}

#[tokio::test]
async fn toggle_flips_the_reported_state() {
    let nch = nch(true);
    let (state, mut events) = app_state(nch_42(true), &nch);

    let result = console::run(&state, &mut events, &request(Task::Toggle, "nch-42", 0), Vec::new())
        .await
        .unwrap();

    assert_eq!(result, Some(WifiState::Off));
    assert_eq!(written(&nch), vec!["Get_Wifi", "Wifi_Disable"]);
}

#[tokio::test]
async fn status_only_queries() {
    let nch = nch(true);
    let (state, mut events) = app_state(nch_42(true), &nch);

    let result = console::run(&state, &mut events, &request(Task::Status, "NCH-42", 0), Vec::new())
        .await
        .unwrap();

    assert_eq!(result, Some(WifiState::On));
    assert_eq!(written(&nch), vec!["Get_Wifi"]);
    assert_eq!(nch.lock().unwrap().closes, 1);
}

#[tokio::test]
async fn pairing_failure_is_retried() {
    let nch = nch(true);
    nch.lock().unwrap().pairing_failures = 1;
    let (state, mut events) = app_state(nch_42(false), &nch);
    let mut output = Vec::new();

    let result = console::run(&state, &mut events, &request(Task::Status, "NCH-42", 1), &mut output)
        .await
        .unwrap();

    assert_eq!(result, Some(WifiState::On));
    let printed = printed_events(&output);
    assert!(printed.contains(&"pairing_failed".to_string()));
    assert_eq!(printed.iter().filter(|e| *e == "pairing_started").count(), 2);
}

#[tokio::test]
async fn pairing_failure_without_retries_gives_up() {
    let nch = nch(true);
    nch.lock().unwrap().pairing_failures = 1;
    let (state, mut events) = app_state(nch_42(false), &nch);

    let err = console::run(&state, &mut events, &request(Task::Enable, "NCH-42", 0), Vec::new())
        .await
        .unwrap_err();

    assert!(err.to_string().contains("pairing rejected"));
    assert!(written(&nch).is_empty());
    assert!(state.bluetooth_manager.lock().await.session_state().is_none());
}

#[tokio::test]
async fn connect_failures_exhaust_retries() {
    let nch = nch(true);
    nch.lock().unwrap().open_failures = 2;
    let (state, mut events) = app_state(nch_42(true), &nch);

    let err = console::run(&state, &mut events, &request(Task::Status, "NCH-42", 1), Vec::new())
        .await
        .unwrap_err();

    assert!(err.to_string().contains("serial service not found"));
    assert!(state.bluetooth_manager.lock().await.session_state().is_none());
}

#[tokio::test(start_paused = true)]
async fn silent_nch_times_out() {
    let nch = nch(true);
    nch.lock().unwrap().silent = true;
    let (state, mut events) = app_state(nch_42(true), &nch);
    let mut output = Vec::new();

    let err = console::run(&state, &mut events, &request(Task::Enable, "NCH-42", 0), &mut output)
        .await
        .unwrap_err();

    assert!(err.to_string().contains("did not answer"));
    assert_eq!(written(&nch), vec!["Get_Wifi"]);
    assert!(printed_events(&output).contains(&"command_timed_out".to_string()));
    assert!(state.bluetooth_manager.lock().await.session_state().is_none());
}

#[tokio::test(start_paused = true)]
async fn missing_nch_is_reported() {
    let nch = nch(true);
    let (state, mut events) = app_state(nch_42(true), &nch);

    let err = console::run(&state, &mut events, &request(Task::Status, "NCH-7", 0), Vec::new())
        .await
        .unwrap_err();

    assert!(err.to_string().contains("NCH-7"));
    assert!(written(&nch).is_empty());
}

#[tokio::test(start_paused = true)]
async fn scan_lists_only_nchs() {
    let nch = nch(true);
    let devices = vec![
        DeviceDescriptor::new("a1", "NCH-1", false),
        DeviceDescriptor::new("s1", "Speaker", false),
        DeviceDescriptor::new("a2", "lab nch 2", true),
    ];
    let (state, mut events) = app_state(devices, &nch);
    let mut output = Vec::new();
    let request = ConsoleRequest {
        task: Task::Scan,
        device: None,
        retries: 0,
    };

    let result = console::run(&state, &mut events, &request, &mut output)
        .await
        .unwrap();

    assert_eq!(result, None);
    assert_eq!(
        printed_events(&output),
        vec!["scan_started", "device_added", "device_added", "scan_complete"]
    );
    let names: Vec<String> = nch_wifi_controller_lib::commands::list_devices(&state)
        .await
        .into_iter()
        .map(|device| device.name)
        .collect();
    assert_eq!(names, vec!["NCH-1", "lab nch 2"]);
}

#[tokio::test]
async fn powered_off_adapter_fails_the_run() {
    let nch = nch(true);
    nch.lock().unwrap().adapter_off = true;
    let (state, mut events) = app_state(nch_42(true), &nch);
    let mut output = Vec::new();

    let err = console::run(&state, &mut events, &request(Task::Status, "NCH-42", 0), &mut output)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("adapter powered off"));
    assert!(!err.to_string().contains("no NCH matching"));
    assert_eq!(printed_events(&output), vec!["scan_started", "scan_failed"]);

    let (state, mut events) = app_state(nch_42(true), &nch);
    let scan = ConsoleRequest {
        task: Task::Scan,
        device: None,
        retries: 0,
    };
    assert!(
        console::run(&state, &mut events, &scan, Vec::new())
            .await
            .is_err()
    );
}

#[tokio::test]
async fn device_tasks_need_a_device() {
    let nch = nch(true);
    let (state, mut events) = app_state(nch_42(true), &nch);
    let request = ConsoleRequest {
        task: Task::Enable,
        device: None,
        retries: 0,
    };

    assert!(
        console::run(&state, &mut events, &request, Vec::new())
            .await
            .is_err()
    );
}
