//! Prepare-then-resolve through the real hybrid cipher.
//!
//! The session here is a loopback: the "peer" public key is the public half of
//! our own session secret, so what we encrypt we can also decrypt.

use std::sync::Arc;

use proptest::prelude::*;
use serde_json::{Map, Value, json};
use shock_crypto::{
    EncryptionPolicy, Envelope, HybridCipher, SessionCipher, SessionCryptoContext, is_empty,
};

fn loopback_cipher() -> SessionCipher {
    let hybrid = Arc::new(HybridCipher::new());
    let public = hybrid.generate_session_key("sess-loop");
    let context = Arc::new(SessionCryptoContext::with_session(public.to_vec(), "sess-loop"));
    SessionCipher::new(hybrid, context, EncryptionPolicy::default())
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .build()
        .unwrap()
}

fn json_leaf() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(|n| json!(n)),
        "[a-zA-Z0-9 ._-]{0,24}".prop_map(Value::String),
    ]
}

fn json_value() -> impl Strategy<Value = Value> {
    json_leaf().prop_recursive(3, 32, 6, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..6).prop_map(Value::Array),
            prop::collection::btree_map("[a-zA-Z]{1,8}", inner, 0..6)
                .prop_map(|m| Value::Object(m.into_iter().collect::<Map<_, _>>())),
        ]
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn resolve_inverts_prepare_for_non_empty_payloads(payload in json_value()) {
        prop_assume!(!is_empty(&payload));
        let rt = runtime();
        let cipher = loopback_cipher();

        let wire = rt.block_on(cipher.prepare_outgoing("ON_CHATS", payload.clone())).unwrap();
        prop_assert!(Envelope::is_envelope(&wire));

        let back = rt.block_on(cipher.resolve_incoming("ON_CHATS", wire)).unwrap();
        prop_assert_eq!(back, payload);
    }
}

#[tokio::test]
async fn two_encryptions_of_same_payload_differ() {
    let cipher = loopback_cipher();
    let payload = json!({"token": "tok", "body": "hello"});
    let a = cipher.prepare_outgoing("SEND_MESSAGE", payload.clone()).await.unwrap();
    let b = cipher.prepare_outgoing("SEND_MESSAGE", payload).await.unwrap();
    assert_ne!(a, b);
}

#[tokio::test]
async fn envelope_survives_json_text_transport() {
    let cipher = loopback_cipher();
    let payload = json!({"ok": true, "msg": [{"id": "c1"}]});
    let wire = cipher.prepare_outgoing("ON_CHATS", payload.clone()).await.unwrap();

    let text = serde_json::to_string(&wire).unwrap();
    let parsed: Value = serde_json::from_str(&text).unwrap();

    assert_eq!(cipher.resolve_incoming("ON_CHATS", parsed).await.unwrap(), payload);
}
