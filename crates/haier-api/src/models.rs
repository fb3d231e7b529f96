// Cloud API request and response types
//
// Every REST response is wrapped in a `{ retCode, retInfo, data }` envelope.
// Fields use `#[serde(default)]` where the cloud is inconsistent about
// presence; anything not modelled explicitly lands in `extra`.

use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// `retCode` value that marks a successful call.
pub const RET_CODE_SUCCESS: &str = "00000";

// ── Response Envelope ────────────────────────────────────────────────

/// Application envelope carried by every REST response.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetEnvelope {
    #[serde(default)]
    pub ret_code: Option<String>,
    #[serde(default)]
    pub ret_info: Option<String>,
}

/// Envelope variant for endpoints whose payload sits under `data`.
#[derive(Debug, Deserialize)]
pub struct DataEnvelope<T> {
    pub data: T,
}

// ── Login ────────────────────────────────────────────────────────────

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct LoginData {
    pub token_info: IssuedToken,
}

/// Token as issued by the login endpoint, before expiry is anchored.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct IssuedToken {
    pub account_token: String,
    pub expires_in: i64,
    pub token_type: String,
    pub refresh_token: String,
    pub uhome_access_token: String,
    pub uhome_user_id: String,
    pub uoc_user_id: String,
}

impl IssuedToken {
    /// Anchor the relative `expiresIn` (seconds) to the login request timestamp.
    pub(crate) fn anchored_at(self, request_timestamp: i64) -> TokenInfo {
        TokenInfo {
            account_token: self.account_token,
            expires_in: self.expires_in,
            token_type: self.token_type,
            refresh_token: self.refresh_token,
            uhome_access_token: self.uhome_access_token,
            uhome_user_id: self.uhome_user_id,
            uoc_user_id: self.uoc_user_id,
            expires_at: request_timestamp.saturating_add(self.expires_in.saturating_mul(1000)),
        }
    }
}

/// Persisted credential record.
///
/// `uhome_access_token` is the token sent on signed requests; `expires_at`
/// is epoch milliseconds.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenInfo {
    pub account_token: String,
    pub expires_in: i64,
    pub token_type: String,
    pub refresh_token: String,
    pub uhome_access_token: String,
    pub uhome_user_id: String,
    pub uoc_user_id: String,
    pub expires_at: i64,
}

impl TokenInfo {
    /// Access token sent in the `accessToken` header.
    pub fn access_token(&self) -> &str {
        &self.uhome_access_token
    }

    /// Whether the token is still usable at `now_ms`.
    pub fn is_valid_at(&self, now_ms: i64) -> bool {
        !self.uhome_access_token.is_empty() && now_ms < self.expires_at
    }
}

impl fmt::Debug for TokenInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenInfo")
            .field("token_type", &self.token_type)
            .field("uhome_user_id", &self.uhome_user_id)
            .field("uoc_user_id", &self.uoc_user_id)
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

// ── Families ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FamilyInfo {
    pub family_id: String,
    pub family_name: String,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct FamilyListData {
    #[serde(default)]
    pub createfamilies: Vec<FamilyInfo>,
    #[serde(default)]
    pub joinfamilies: Vec<FamilyInfo>,
}

impl FamilyListData {
    /// Owned families first, then the ones the account was invited to.
    pub(crate) fn into_families(self) -> Vec<FamilyInfo> {
        let mut all = self.createfamilies;
        all.extend(self.joinfamilies);
        all
    }
}

// ── Devices ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceInfo {
    pub base_info: BaseInfo,
    #[serde(default)]
    pub extended_info: serde_json::Map<String, Value>,
}

/// Identity fields of a bound device.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BaseInfo {
    pub device_id: String,
    #[serde(default)]
    pub device_name: String,
    #[serde(default)]
    pub dev_name: Option<String>,
    #[serde(default)]
    pub device_type: Option<String>,
    #[serde(default)]
    pub family_id: Option<String>,
    #[serde(default)]
    pub is_online: Option<bool>,
    /// Catch-all for undocumented fields.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl DeviceInfo {
    pub fn device_id(&self) -> &str {
        &self.base_info.device_id
    }

    pub fn display_name(&self) -> &str {
        if self.base_info.device_name.is_empty() {
            self.base_info
                .dev_name
                .as_deref()
                .unwrap_or(&self.base_info.device_id)
        } else {
            &self.base_info.device_name
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct FamilyDevicesData {
    #[serde(default)]
    pub deviceinfos: Vec<DeviceInfo>,
}

// ── Digital models ───────────────────────────────────────────────────

/// Raw `detailInfo` map: device id → model, either as a JSON string or an
/// already-decoded object. Interpretation is left to the caller.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct DigitalModelsResponse {
    #[serde(default)]
    pub detail_info: IndexMap<String, Value>,
}

// ── Live-channel assignment ──────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct AssignData {
    pub ag_addr: String,
}

// ── Commands ─────────────────────────────────────────────────────────

/// One command: attribute name → new value.
pub type CommandArgs = IndexMap<String, String>;

/// A single command within a batch, addressed by its index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CmdMsg {
    pub device_id: String,
    pub index: usize,
    pub sub_sn: String,
    pub cmd_args: CommandArgs,
}

impl CmdMsg {
    /// Build the message list for a batch; `subSn` is `"<sn>:<index>"`.
    pub fn batch(device_id: &str, sn: &str, commands: &[CommandArgs]) -> Vec<Self> {
        commands
            .iter()
            .enumerate()
            .map(|(index, args)| Self {
                device_id: device_id.to_owned(),
                index,
                sub_sn: format!("{sn}:{index}"),
                cmd_args: args.clone(),
            })
            .collect()
    }
}

/// REST body for the batch command endpoint.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchCommand {
    pub sn: String,
    pub cmd_msg_list: Vec<CmdMsg>,
}
