//! Offline mock replies end to end, no network and no credential.

use std::sync::Arc;

use coach_greg::agent_core::{ChatSession, Transcript, TurnRequest};
use coach_greg::inference::{
    collect_text, decode_fragments, ChatClient, ChatConfig, Credentials, PromptBuilder,
    SecretSource, SecretsFile, SendOptions,
};
use futures::StreamExt;

fn offline_config() -> ChatConfig {
    ChatConfig {
        use_remote: false,
        ..ChatConfig::default()
    }
}

fn no_credentials() -> Credentials {
    let empty: Arc<dyn SecretSource> = Arc::new(SecretsFile::empty());
    Credentials::from_sources(vec![empty])
}

#[tokio::test]
async fn sprint_review_scenario() {
    let session = ChatSession::from_config(&offline_config(), no_credentials()).unwrap();
    let request = TurnRequest::new("How do I write a Sprint Review agenda?", false).unwrap();

    let mut fragments = Vec::new();
    let (transcript, outcome) = session
        .run_turn(Transcript::new(50), &request, |f| fragments.push(f.to_string()))
        .await;

    assert_eq!(fragments, vec!["[Mock] How do I write a Sprint Review agenda?"]);
    assert!(outcome.is_success());
    assert_eq!(outcome.reply, "[Mock] How do I write a Sprint Review agenda?");
    assert_eq!(transcript.len(), 2);
}

#[tokio::test]
async fn mock_reply_matches_prefix_rule() {
    let client = ChatClient::from_config(&offline_config(), no_credentials()).unwrap();
    let options = SendOptions::from_config(&offline_config());
    let builder = PromptBuilder::default();

    for text in ["WBS?", "critical path vs. sprint goal", "  spaced  ", "ünïcødé ✓"] {
        for force_compare in [false, true] {
            let prompt = builder.build(text, force_compare);
            let handle = client.send(&prompt, &options).await.unwrap();

            let fragments: Vec<_> = decode_fragments(handle).collect().await;
            assert_eq!(fragments.len(), 1, "exactly one fragment for {text:?}");

            let expected = format!(
                "[Mock] {}{}",
                if force_compare { "(Compare) " } else { "" },
                text
            );
            assert_eq!(fragments[0].as_ref().unwrap().as_str(), expected);
        }
    }
}

#[tokio::test]
async fn offline_handle_is_single_pass() {
    let client = ChatClient::from_config(&offline_config(), no_credentials()).unwrap();
    let prompt = PromptBuilder::default().build("retro formats", false);
    let mut handle = client
        .send(&prompt, &SendOptions::from_config(&offline_config()))
        .await
        .unwrap();

    assert!(handle.next().await.is_some());
    assert!(handle.next().await.is_none());
    assert_eq!(collect_text(handle).await.unwrap(), "");
}
