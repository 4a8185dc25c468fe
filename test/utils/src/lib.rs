use std::env;

pub fn insta_snapshot<F: FnOnce()>(f: F) {
    let mut settings = insta::Settings::clone_current();
    let snapshot_path = env::current_dir().unwrap().join("./test/snapshots");
    settings.set_snapshot_path(snapshot_path);
    settings.bind(f);
}

/// A state blob as an earlier build might have stored it: two sessions, a
/// settled assisted-mode conversation, a typing flag that never got cleared,
/// and a couple of fields newer readers do not know about.
pub fn state_blob_fixture() -> &'static str {
    return r#"{
  "v": 2,
  "sessions": {
    "maya@studio.fm:42": {
      "v": 1,
      "ownerEmail": "maya@studio.fm",
      "selectedMode": "assisted",
      "completedSteps": 3,
      "hasCompletedAnalysis": true,
      "modeStates": {
        "guided": {"messages": [], "currentStep": 3, "scrollOffset": 0.0},
        "assisted": {
          "messages": [
            {"id": "18f0-aa", "role": "user", "content": "warm up this pad", "createdAt": 1700000001000},
            {"id": "18f1-ab", "role": "assistant", "content": "Run it through a chorus, then high-pass everything under 180 Hz.", "createdAt": 1700000002000}
          ],
          "currentStep": 0,
          "scrollOffset": 312.5
        },
        "expert": {"messages": []}
      },
      "pendingAi": null,
      "savedAt": 1700000002000,
      "appVersion": "0.9.3"
    },
    "legacy:7": {
      "v": 1,
      "ownerEmail": "legacy",
      "modeStates": {
        "guided": {
          "messages": [
            {"id": "old-1", "role": "user", "content": "first session", "createdAt": 1690000000000, "isTyping": true}
          ]
        }
      },
      "savedAt": 1690000000000
    }
  },
  "savedAt": 1700000002000,
  "schema": "encore-chat"
}"#;
}
