// Endpoint URL construction.
//
// The cloud is split across two hosts: the account host (login, families,
// device listing) and the uws host (digital models, commands, live-channel
// assignment). Both bases are configurable so tests can point at a mock.

use std::sync::LazyLock;

use url::Url;

use crate::error::Error;

pub const DEFAULT_ACCOUNT_URL: &str = "https://zj.haier.net";
pub const DEFAULT_UWS_URL: &str = "https://uws.haier.net";

pub(crate) const LOGIN_PATH: &str = "/oauthserver/account/v1/login";
const FAMILY_LIST_PATH: &str = "/api-gw/wisdomfamily/family/v4/family/list";
const FAMILY_DEVICES_PATH: &str = "/api-gw/wisdomdevice/applent/device/v2/family/devices";
const DIGITAL_MODELS_PATH: &str = "/shadow/v1/devdigitalmodels";
const BATCH_COMMAND_PATH: &str = "/stdudse/v1/sendbatchCmd";
const WS_ASSIGN_PATH: &str = "/gmsWS/wsag/assign";
const WS_GATEWAY_PATH: &str = "/userag";

/// Base URLs for the two cloud hosts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub account: Url,
    pub uws: Url,
}

/// Production hosts, parsed once. Both are compile-time constants covered
/// by `defaults_split_hosts`, so the parse cannot fail at run time.
static PRODUCTION: LazyLock<Endpoints> = LazyLock::new(|| Endpoints {
    account: Url::parse(DEFAULT_ACCOUNT_URL).expect("valid default account URL"),
    uws: Url::parse(DEFAULT_UWS_URL).expect("valid default uws URL"),
});

impl Default for Endpoints {
    fn default() -> Self {
        PRODUCTION.clone()
    }
}

impl Endpoints {
    /// Point both hosts at the same base (used by tests against one mock server).
    pub fn single(base: Url) -> Self {
        Self {
            account: base.clone(),
            uws: base,
        }
    }

    fn join(base: &Url, path: &str) -> Result<Url, Error> {
        Ok(base.join(path)?)
    }

    pub fn login(&self) -> Result<Url, Error> {
        Self::join(&self.account, LOGIN_PATH)
    }

    pub fn family_list(&self) -> Result<Url, Error> {
        Self::join(&self.account, FAMILY_LIST_PATH)
    }

    pub fn family_devices(&self, family_id: &str) -> Result<Url, Error> {
        let mut url = Self::join(&self.account, FAMILY_DEVICES_PATH)?;
        url.query_pairs_mut().append_pair("familyId", family_id);
        Ok(url)
    }

    pub fn digital_models(&self) -> Result<Url, Error> {
        Self::join(&self.uws, DIGITAL_MODELS_PATH)
    }

    pub fn batch_command(&self, device_id: &str) -> Result<Url, Error> {
        let mut url = Self::join(&self.uws, BATCH_COMMAND_PATH)?;
        url.path_segments_mut()
            .map_err(|()| Error::Validation {
                message: format!("uws base URL cannot carry a path: {}", self.uws),
            })?
            .push(device_id);
        Ok(url)
    }

    pub fn ws_assign(&self) -> Result<Url, Error> {
        Self::join(&self.uws, WS_ASSIGN_PATH)
    }

    /// Build the live-channel URL from an assigned gateway address.
    ///
    /// The gateway address replaces the path with `/userag` and carries the
    /// access token and client identity as query parameters.
    pub fn gateway(agent_addr: &str, token: &str, client_id: &str) -> Result<Url, Error> {
        let mut url = Url::parse(agent_addr)?;
        url.set_path(WS_GATEWAY_PATH);
        url.set_query(None);
        url.query_pairs_mut()
            .append_pair("token", token)
            .append_pair("agClientId", client_id);
        Ok(url)
    }
}
