use pretty_assertions::assert_eq;

use pgp_exchange::{Error, ExchangeKeys, PublicKeyRingBundle, SecretKeyRingBundle};

const ALICE_PUB: &str = "tests/fixtures/alice.pub.asc";
const ALICE_SEC: &str = "tests/fixtures/alice.sec.asc";
const BOB_PUB: &str = "tests/fixtures/bob.pub.asc";
const PUBRING: &str = "tests/fixtures/pubring.pgp";
const SECRING: &str = "tests/fixtures/secring.pgp";
const ALICE_PASS: &str = "correct-horse";

#[test]
fn loads_armored_and_binary_keyrings() {
    let _ = pretty_env_logger::try_init();

    let single = PublicKeyRingBundle::from_path(ALICE_PUB).unwrap();
    assert_eq!(single.rings().len(), 1);

    let bundle = PublicKeyRingBundle::from_path(PUBRING).unwrap();
    assert_eq!(bundle.rings().len(), 2);

    let secrets = SecretKeyRingBundle::from_path(SECRING).unwrap();
    assert_eq!(secrets.rings().len(), 2);
}

#[test]
fn resolves_keys_by_user_id_substring() {
    let keys = ExchangeKeys::from_paths(PUBRING, "alice", SECRING, "alice", ALICE_PASS).unwrap();
    assert!(keys
        .encryption_key()
        .user_ids()
        .iter()
        .any(|id| id.contains("Alice Lovelace")));
    assert!(keys
        .signing_key()
        .user_ids()
        .iter()
        .any(|id| id.contains("Alice Lovelace")));
}

// pubring.pgp holds bob's ring first, alice's second. A substring that only
// matches the second ring must reach it; a substring matching both must
// resolve to the first ring.
#[test]
fn ring_order_is_respected() {
    let bundle = PublicKeyRingBundle::from_path(PUBRING).unwrap();

    let second_ring_only = bundle.resolve_encryption_key("alice").unwrap();
    assert!(second_ring_only
        .user_ids()
        .iter()
        .any(|id| id.contains("Alice")));

    let both_match = bundle.resolve_encryption_key("example.org").unwrap();
    assert!(both_match.user_ids().iter().any(|id| id.contains("Bob")));
    assert_ne!(second_ring_only.key_id(), both_match.key_id());
}

#[test]
fn user_id_match_is_case_sensitive() {
    let bundle = PublicKeyRingBundle::from_path(PUBRING).unwrap();
    let err = bundle.resolve_encryption_key("ALICE").unwrap_err();
    assert!(matches!(err, Error::KeyNotFound { .. }), "{err:?}");
}

#[test]
fn unknown_user_id_fails_with_key_not_found() {
    let err = ExchangeKeys::from_paths(PUBRING, "alice", SECRING, "nobody", ALICE_PASS)
        .unwrap_err();
    assert!(matches!(err, Error::KeyNotFound { .. }), "{err:?}");
}

#[test]
fn missing_key_source_fails_fast() {
    let err = ExchangeKeys::from_paths(
        "tests/fixtures/nope.asc",
        "alice",
        SECRING,
        "alice",
        ALICE_PASS,
    )
    .unwrap_err();
    assert!(matches!(err, Error::KeySourceNotFound { .. }), "{err:?}");
}

#[test]
fn empty_passphrase_is_rejected_before_keyring_io() {
    let err = ExchangeKeys::from_paths(PUBRING, "alice", SECRING, "alice", "").unwrap_err();
    assert!(matches!(err, Error::InvalidArgument { .. }), "{err:?}");
}

#[test]
fn wrong_passphrase_fails_with_invalid_passphrase() {
    let err =
        ExchangeKeys::from_paths(ALICE_PUB, "alice", ALICE_SEC, "alice", "bogus").unwrap_err();
    assert!(matches!(err, Error::InvalidPassphrase { .. }), "{err:?}");
}

#[test]
fn key_lookup_by_id_covers_primaries_and_subkeys() {
    let bundle = PublicKeyRingBundle::from_path(PUBRING).unwrap();
    let alice = bundle.resolve_encryption_key("alice").unwrap();
    let found = bundle.find_key_by_id(&alice.key_id()).unwrap();
    assert_eq!(found.key_id(), alice.key_id());

    for ring in bundle.rings() {
        for sub in &ring.public_subkeys {
            use pgp_exchange::pgp::types::PublicKeyTrait;
            let id = sub.key.key_id();
            assert_eq!(bundle.find_key_by_id(&id).unwrap().key_id(), id);
        }
    }

    let bob_only = PublicKeyRingBundle::from_path(BOB_PUB).unwrap();
    assert!(bob_only.find_key_by_id(&alice.key_id()).is_none());
}
