//! Pairing (C5): processes the `pair-success` stanza, producing a
//! credentials delta and the reply node to send back. No I/O — the caller
//! persists the delta and transmits the reply (spec.md §4.5).
//!
//! Structurally grounded on the teacher's `auth::pairing::PairingFlow`
//! state machine, but the HMAC/signature algorithm itself is a full
//! rewrite: the teacher's `PairingChallenge` used a bare SHA-256
//! challenge/response with no relation to the ADV scheme this spec
//! requires.

use serde::{Deserialize, Serialize};
use serde_big_array::BigArray;

use crate::creds::{Account, Credentials, Me, SignalIdentity};
use crate::crypto;
use crate::error::PairError;
use crate::node::Node;
use crate::types::{Jid, SignalAddress};

mod option_big_array {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use serde_big_array::BigArray;

    pub fn serialize<S, const N: usize>(
        value: &Option<[u8; N]>,
        serializer: S,
    ) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        #[derive(Serialize)]
        struct Wrapper<const N: usize>(#[serde(with = "BigArray")] [u8; N]);

        value.map(Wrapper).serialize(serializer)
    }

    pub fn deserialize<'de, D, const N: usize>(
        deserializer: D,
    ) -> Result<Option<[u8; N]>, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct Wrapper<const N: usize>(#[serde(with = "BigArray")] [u8; N]);

        Ok(Option::<Wrapper<N>>::deserialize(deserializer)?.map(|w| w.0))
    }
}

const HOSTED_HMAC_PREFIX: [u8; 2] = [6, 5];
const ACCOUNT_SIGNATURE_PREFIX: [u8; 2] = [6, 0];
const DEVICE_SIGNATURE_PREFIX_HOSTED: [u8; 2] = [6, 6];
const DEVICE_SIGNATURE_PREFIX_DEFAULT: [u8; 2] = [6, 1];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccountType {
    Hosted,
    Default,
}

/// `ADVSignedDeviceIdentityHMAC` (spec.md §4.5 step 2). Carried bit-exactly
/// on the wire; the exact byte layout is an external collaborator's
/// concern, so it round-trips here as a JSON envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdvSignedDeviceIdentityHmac {
    pub details: Vec<u8>,
    pub hmac: [u8; 32],
    pub account_type: AccountType,
}

/// `ADVSignedDeviceIdentity` (spec.md §4.5 step 4).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdvSignedDeviceIdentity {
    pub account_signature_key: Option<[u8; 32]>,
    #[serde(with = "BigArray")]
    pub account_signature: [u8; 64],
    #[serde(with = "option_big_array")]
    pub device_signature: Option<[u8; 64]>,
    pub details: Vec<u8>,
}

pub struct PairingInput<'a> {
    pub adv_secret_key: &'a [u8; 32],
    pub signed_identity_key: &'a crypto::KeyPair,
}

pub struct PairSuccessOutput {
    pub creds_delta: CredsDelta,
    pub reply_node: Node,
}

/// Only the fields a successful pair actually sets, applied on top of the
/// caller's existing `Credentials`.
pub struct CredsDelta {
    pub registered: bool,
    pub account: Account,
    pub me: Me,
    pub platform: String,
    pub signal_identity: SignalIdentity,
}

impl CredsDelta {
    pub fn apply(self, mut creds: Credentials) -> Credentials {
        creds.registered = self.registered;
        creds.account = Some(self.account);
        creds.me = Some(self.me);
        creds.platform = Some(self.platform);
        creds.signal_identities.push(self.signal_identity);
        creds
    }
}

/// Implements spec.md §4.5's 9-step algorithm over a parsed `pair-success`
/// node.
pub fn configure_successful_pairing(stanza: &Node, msg_id: &str, input: PairingInput<'_>) -> Result<PairSuccessOutput, PairError> {
    // Step 1: extract children.
    let device_identity = stanza
        .find_child("device-identity")
        .ok_or_else(|| PairError::MalformedNode("missing device-identity".to_string()))?;
    let device = stanza
        .find_child("device")
        .ok_or_else(|| PairError::MalformedNode("missing device".to_string()))?;
    let platform_node = stanza.find_child("platform");
    let biz_node = stanza.find_child("biz");

    // Step 2: decode ADVSignedDeviceIdentityHMAC from device-identity.content.
    let hmac_content = device_identity
        .get_binary()
        .ok_or_else(|| PairError::MalformedNode("device-identity missing binary content".to_string()))?;
    let hmac_wrapper: AdvSignedDeviceIdentityHmac =
        serde_json::from_slice(hmac_content).map_err(|e| PairError::MalformedNode(e.to_string()))?;
    let is_hosted = matches!(hmac_wrapper.account_type, AccountType::Hosted);

    // Step 3: verify the ADV secret HMAC.
    let hmac_prefix: &[u8] = if is_hosted { &HOSTED_HMAC_PREFIX } else { &[] };
    let mut hmac_input = Vec::with_capacity(hmac_prefix.len() + hmac_wrapper.details.len());
    hmac_input.extend_from_slice(hmac_prefix);
    hmac_input.extend_from_slice(&hmac_wrapper.details);
    let expected = crypto::kdf::hmac_sha256(input.adv_secret_key, &hmac_input);
    if expected != hmac_wrapper.hmac {
        return Err(PairError::BadHMAC);
    }

    // Step 4: decode ADVSignedDeviceIdentity from details.
    let identity: AdvSignedDeviceIdentity =
        serde_json::from_slice(&hmac_wrapper.details).map_err(|e| PairError::MalformedNode(e.to_string()))?;
    let account_signature_key = identity
        .account_signature_key
        .ok_or_else(|| PairError::MalformedNode("missing accountSignatureKey".to_string()))?;

    // Step 5: verify the account signature.
    let mut account_sig_message = Vec::with_capacity(2 + identity.details.len() + 32);
    account_sig_message.extend_from_slice(&ACCOUNT_SIGNATURE_PREFIX);
    account_sig_message.extend_from_slice(&identity.details);
    account_sig_message.extend_from_slice(&input.signed_identity_key.public);
    crypto::verify(&account_signature_key, &account_sig_message, &identity.account_signature)
        .map_err(|_| PairError::BadAccountSignature)?;

    // Step 6: produce our device signature.
    let device_prefix = if is_hosted {
        DEVICE_SIGNATURE_PREFIX_HOSTED
    } else {
        DEVICE_SIGNATURE_PREFIX_DEFAULT
    };
    let mut device_sig_message = Vec::with_capacity(2 + identity.details.len() + 32 + 32);
    device_sig_message.extend_from_slice(&device_prefix);
    device_sig_message.extend_from_slice(&identity.details);
    device_sig_message.extend_from_slice(&input.signed_identity_key.public);
    device_sig_message.extend_from_slice(&account_signature_key);
    let device_signature = crypto::sign(
        &input.signed_identity_key.private,
        &input.signed_identity_key.public,
        &device_sig_message,
    );

    // Step 7: re-encode with the account key cleared.
    let reply_identity = AdvSignedDeviceIdentity {
        account_signature_key: None,
        account_signature: identity.account_signature,
        device_signature: Some(device_signature),
        details: identity.details.clone(),
    };
    let reply_bytes = serde_json::to_vec(&reply_identity).map_err(|e| PairError::MalformedNode(e.to_string()))?;

    // Step 8: build the reply node.
    let key_index = device.get_attr("key-index").unwrap_or("0").to_string();
    let reply_node = Node::new("iq")
        .attr("type", "result")
        .attr("to", "s.whatsapp.net")
        .attr("id", msg_id)
        .with_children(vec![Node::new("pair-device-sign").with_children(vec![Node::new("device-identity")
            .attr("key-index", key_index)
            .with_binary(reply_bytes)])]);

    // Step 9: emit the creds delta.
    let jid: Jid = device
        .get_attr("jid")
        .ok_or_else(|| PairError::MalformedNode("device missing jid".to_string()))?
        .parse()
        .map_err(|_| PairError::MalformedNode("device jid did not parse".to_string()))?;
    let lid = device.get_attr("lid").map(str::to_string);
    let biz_name = biz_node.and_then(|n| n.get_attr("name")).map(str::to_string);
    let platform = platform_node.and_then(|n| n.get_attr("name")).unwrap_or("web").to_string();

    let creds_delta = CredsDelta {
        registered: true,
        account: Account {
            details: identity.details,
            account_signature_key,
            account_signature: identity.account_signature,
            device_signature,
        },
        me: Me {
            id: jid.to_string(),
            name: biz_name,
            lid: lid.clone(),
        },
        platform,
        signal_identity: SignalIdentity {
            identifier: SignalAddress::new(lid.unwrap_or_else(|| jid.user.clone()), 0),
            identifier_key: account_signature_key,
        },
    };

    Ok(PairSuccessOutput { creds_delta, reply_node })
}
