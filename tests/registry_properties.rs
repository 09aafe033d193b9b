//! Property-based tests for discovery bookkeeping.

use std::collections::HashMap;

use proptest::prelude::*;

use nch_wifi_controller_lib::core::bluetooth::{
    DeviceDescriptor, EventSender, SessionEvent, SessionRegistry,
};

/// A small address space so that repeats are common.
fn descriptor() -> impl Strategy<Value = DeviceDescriptor> {
    (
        0u8..6,
        prop_oneof![
            Just("NCH-1"),
            Just("nch-1"),
            Just("Lab NCH"),
            Just("Speaker"),
            Just("Keyboard"),
        ],
        any::<bool>(),
    )
        .prop_map(|(address, name, is_paired)| {
            DeviceDescriptor::new(format!("00:00:00:00:00:0{}", address), name, is_paired)
        })
}

proptest! {
    /// Every address appears once, holding its latest NCH descriptor.
    #[test]
    fn each_address_is_listed_once(reports in prop::collection::vec(descriptor(), 0..40)) {
        let (events, mut rx) = EventSender::channel();
        let mut registry = SessionRegistry::new("nch", events);
        registry.begin_scan().unwrap();

        let mut latest: HashMap<String, DeviceDescriptor> = HashMap::new();
        for report in &reports {
            registry.on_device_found(report.clone());
            if report.name.to_lowercase().contains("nch") {
                latest.insert(report.address.clone(), report.clone());
            }
        }

        let listed: Vec<&DeviceDescriptor> = registry.devices().collect();
        prop_assert_eq!(listed.len(), latest.len());
        for device in listed {
            prop_assert_eq!(Some(device), latest.get(&device.address));
        }

        let mut added = 0;
        while let Ok(event) = rx.try_recv() {
            match event {
                SessionEvent::ScanStarted => {}
                SessionEvent::DeviceAdded(device) => {
                    prop_assert!(device.name.to_lowercase().contains("nch"));
                    added += 1;
                }
                SessionEvent::DeviceUpdated(device) => {
                    prop_assert!(device.name.to_lowercase().contains("nch"));
                }
                other => prop_assert!(false, "unexpected event {:?}", other),
            }
        }
        prop_assert_eq!(added, latest.len());
    }

    /// Reporting the same descriptor again never emits anything.
    #[test]
    fn repeated_reports_are_silent(report in descriptor(), repeats in 1usize..5) {
        let (events, mut rx) = EventSender::channel();
        let mut registry = SessionRegistry::new("nch", events);
        registry.begin_scan().unwrap();
        registry.on_device_found(report.clone());
        while rx.try_recv().is_ok() {}

        for _ in 0..repeats {
            registry.on_device_found(report.clone());
        }
        prop_assert!(rx.try_recv().is_err());
    }
}
