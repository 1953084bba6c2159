mod common;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use pilot_bridge_adapters::{CapturedError, MemoryErrorTracker, NetworkDetector};
use pilot_bridge_core::{
    BridgeError, DetectionResult, Message, NetworkTrackingState, RequestBody, TabId,
    TabMessenger,
};

use common::{chain, ScriptedTabs};

const URL: &str = "https://rpc.example.org";
const TAB: TabId = TabId(3);

fn detector(tabs: &Arc<ScriptedTabs>, timeout: Duration) -> (NetworkDetector, MemoryErrorTracker) {
    let tracker = MemoryErrorTracker::new();
    let detector = NetworkDetector::new(
        Arc::new(Mutex::new(NetworkTrackingState::new())),
        Arc::clone(tabs) as Arc<dyn TabMessenger>,
        Arc::new(tracker.clone()),
        timeout,
    );
    (detector, tracker)
}

fn has_pending_probe(detector: &NetworkDetector, url: &str) -> bool {
    detector
        .state()
        .lock()
        .expect("state lock")
        .has_pending_probe(url)
}

#[tokio::test(start_paused = true)]
async fn concurrent_detections_share_one_probe() {
    let tabs = Arc::new(
        ScriptedTabs::probing(Some(chain(100))).with_delay(Duration::from_millis(50)),
    );
    let (detector, tracker) = detector(&tabs, Duration::from_secs(10));

    let (a, b, c) = tokio::join!(
        detector.detect_network_of_rpc_url(URL, TAB),
        detector.detect_network_of_rpc_url(URL, TAB),
        detector.detect_network_of_rpc_url(URL, TAB),
    );

    assert_eq!(tabs.probe_count(), 1);
    let new_count = [a, b, c].iter().filter(|r| r.new_endpoint).count();
    assert_eq!(new_count, 1);
    assert_eq!(detector.chain_id_of(URL), Some(chain(100)));
    assert_eq!(detector.rpc_urls_for_tab(TAB), vec![URL.to_owned()]);
    assert!(!has_pending_probe(&detector, URL));
    assert!(tracker.captured().is_empty());
}

#[tokio::test]
async fn confirmed_urls_are_not_probed_again() {
    let tabs = Arc::new(ScriptedTabs::probing(Some(chain(10))));
    let (detector, _) = detector(&tabs, Duration::from_secs(10));

    assert_eq!(
        detector.detect_network_of_rpc_url(URL, TAB).await,
        DetectionResult::NEW
    );
    assert_eq!(
        detector.detect_network_of_rpc_url(URL, TabId(4)).await,
        DetectionResult::KNOWN
    );
    assert_eq!(tabs.probe_count(), 1);
    assert!(detector.rpc_urls_for_tab(TabId(4)).is_empty());

    let (tab_id, message) = &tabs.sent()[0];
    assert_eq!(*tab_id, TAB);
    assert_eq!(
        *message,
        Message::ProbeChainId {
            url: URL.to_owned()
        }
    );
}

#[tokio::test(start_paused = true)]
async fn timed_out_probe_is_evicted_and_retried() {
    let tabs = Arc::new(
        ScriptedTabs::probing(Some(chain(1))).with_delay(Duration::from_secs(60)),
    );
    let (detector, tracker) = detector(&tabs, Duration::from_secs(10));

    assert_eq!(
        detector.detect_network_of_rpc_url(URL, TAB).await,
        DetectionResult::KNOWN
    );
    assert!(!has_pending_probe(&detector, URL));
    assert_eq!(detector.chain_id_of(URL), None);

    let captured = tracker.captured();
    assert_eq!(captured.len(), 1);
    assert!(matches!(&captured[0], CapturedError::Message(text) if text.contains("timed out")));

    // The next detection starts a fresh probe.
    assert_eq!(
        detector.detect_network_of_rpc_url(URL, TAB).await,
        DetectionResult::KNOWN
    );
    assert_eq!(tabs.probe_count(), 2);
}

#[tokio::test]
async fn missing_content_script_is_reported_and_evicted() {
    let tabs = Arc::new(ScriptedTabs::new(|tab_id, _| Err(BridgeError::NoReceiver(tab_id))));
    let (detector, tracker) = detector(&tabs, Duration::from_secs(10));

    assert_eq!(
        detector.detect_network_of_rpc_url(URL, TAB).await,
        DetectionResult::KNOWN
    );
    assert!(!has_pending_probe(&detector, URL));
    assert!(tracker.captured()[0].text().contains("no receiving end"));
}

#[tokio::test]
async fn inconclusive_probe_is_reported_and_evicted() {
    let tabs = Arc::new(ScriptedTabs::probing(None));
    let (detector, tracker) = detector(&tabs, Duration::from_secs(10));

    assert_eq!(
        detector.detect_network_of_rpc_url(URL, TAB).await,
        DetectionResult::KNOWN
    );
    assert!(!has_pending_probe(&detector, URL));
    assert_eq!(detector.chain_id_of(URL), None);
    assert_eq!(tracker.captured().len(), 1);

    detector.detect_network_of_rpc_url(URL, TAB).await;
    assert_eq!(tabs.probe_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn passive_detection_wins_over_a_slower_probe() {
    let tabs = Arc::new(
        ScriptedTabs::probing(Some(chain(1))).with_delay(Duration::from_millis(100)),
    );
    let (detector, _) = detector(&tabs, Duration::from_secs(10));
    let body = RequestBody::from_json_text(r#"{"chainId":"0x64","method":"eth_call"}"#);

    let (active, passive) = tokio::join!(detector.detect_network_of_rpc_url(URL, TAB), async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        detector.parse_network_from_request_body(&body, URL, TAB)
    });

    assert_eq!(passive, DetectionResult::NEW);
    assert_eq!(active, DetectionResult::KNOWN);
    assert_eq!(detector.chain_id_of(URL), Some(chain(100)));
    assert!(!has_pending_probe(&detector, URL));
}

#[tokio::test]
async fn closing_a_tab_forgets_its_urls() {
    let tabs = Arc::new(ScriptedTabs::probing(Some(chain(8453))));
    let (detector, _) = detector(&tabs, Duration::from_secs(10));

    assert!(detector.track_tab(TAB));
    detector.detect_network_of_rpc_url(URL, TAB).await;
    assert!(detector.is_tracked(TAB));

    assert!(detector.untrack_tab(TAB));
    assert!(!detector.is_tracked(TAB));
    assert!(detector.rpc_urls_for_tab(TAB).is_empty());
    assert_eq!(detector.chain_id_of(URL), Some(chain(8453)));
}
