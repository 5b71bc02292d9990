//! Operation wrappers built on the call pipeline: the authentication
//! handshake plus a few user, query, photo and preference calls.

use std::collections::BTreeMap;

use serde_json::{Map, Value};
use tracing::info;

use crate::client::RestClient;
use crate::error::{ApiError, Result};
use crate::http::Upload;
use crate::method::methods;
use crate::preferences;
use crate::response::{parse_int, ApiResponse};

const NO_PARAMS: [(&str, &str); 0] = [];

/// Optional arguments of `photos_upload`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PhotoUpload {
    pub caption: Option<String>,
    pub album_id: Option<i64>,
}

impl PhotoUpload {
    pub fn caption(mut self, caption: impl Into<String>) -> Self {
        self.caption = Some(caption.into());
        self
    }

    pub fn album(mut self, album_id: i64) -> Self {
        self.album_id = Some(album_id);
        self
    }
}

impl RestClient {
    /// Obtain a one-time token for the user to log in with.
    pub fn auth_create_token(&mut self) -> Result<String> {
        let token = self.invoke_scalar(&methods::AUTH_CREATE_TOKEN, NO_PARAMS)?;
        self.session.record_token(&token);
        Ok(token)
    }

    /// Exchange `auth_token` for a session and store it on the client.
    /// Returns the session key.
    pub fn auth_get_session(&mut self, auth_token: &str) -> Result<String> {
        let response = self.invoke(&methods::AUTH_GET_SESSION, [("auth_token", auth_token)])?;
        self.session.establish(&response)?;
        info!(
            user_id = self.session.user_id(),
            expires = self.session.expires(),
            "session established"
        );
        Ok(self.session.session_key().unwrap_or_default().to_string())
    }

    /// Establish a session from `auth_token` unless one is held, then ask
    /// the server who is logged in.
    pub fn auth_get_user_id(&mut self, auth_token: &str) -> Result<i64> {
        if !self.is_session_established() {
            self.auth_get_session(auth_token)?;
        }
        self.users_get_logged_in_user()
    }

    pub fn users_get_logged_in_user(&self) -> Result<i64> {
        parse_int(&self.invoke_scalar(&methods::USERS_GET_LOGGED_IN_USER, NO_PARAMS)?)
    }

    pub fn users_is_app_added(&self) -> Result<bool> {
        Ok(self.invoke_scalar(&methods::USERS_IS_APP_ADDED, NO_PARAMS)? == "1")
    }

    /// Whether the user granted the extended permission `permission`
    /// (e.g. `status_update`).
    pub fn users_has_app_permission(&self, permission: &str) -> Result<bool> {
        let scalar =
            self.invoke_scalar(&methods::USERS_HAS_APP_PERMISSION, [("ext_perm", permission)])?;
        Ok(scalar == "1")
    }

    pub fn fql_query(&self, query: &str) -> Result<ApiResponse> {
        if query.trim().is_empty() {
            return Err(ApiError::invalid_parameter("query must not be empty"));
        }
        self.invoke(&methods::FQL_QUERY, [("query", query)])
    }

    pub fn photos_upload(&self, upload: &Upload, options: &PhotoUpload) -> Result<ApiResponse> {
        let mut params = Vec::with_capacity(methods::PHOTOS_UPLOAD.param_count());
        if let Some(album_id) = options.album_id {
            params.push(("aid", album_id.to_string()));
        }
        if let Some(caption) = &options.caption {
            params.push(("caption", caption.clone()));
        }
        self.invoke_upload(&methods::PHOTOS_UPLOAD, params, upload)
    }

    /// The stored value of preference `pref_id`, or `None` if unset.
    pub fn data_get_user_preference(&self, pref_id: u32) -> Result<Option<String>> {
        preferences::validate_id(pref_id)?;
        let response = self.invoke(
            &methods::DATA_GET_USER_PREFERENCE,
            [("pref_id", pref_id.to_string())],
        )?;
        Ok(preferences::decode(&response.extract_string()))
    }

    /// Every preference currently set for the user.
    pub fn data_get_user_preferences(&self) -> Result<BTreeMap<u32, String>> {
        let response = self.invoke(&methods::DATA_GET_USER_PREFERENCES, NO_PARAMS)?;
        let root = response.root();
        let ids = root.descendants_named("pref_id");
        let values = root.descendants_named("value");
        if ids.len() != values.len() {
            return Err(ApiError::Parse(format!(
                "{} preference ids but {} values",
                ids.len(),
                values.len()
            )));
        }

        let mut result = BTreeMap::new();
        for (id, value) in ids.into_iter().zip(values) {
            let id_text = id.text_content();
            let pref_id = id_text
                .trim()
                .parse()
                .map_err(|_| ApiError::Parse(format!("bad preference id {id_text:?}")))?;
            if let Some(value) = preferences::decode(&value.text_content()) {
                result.insert(pref_id, value);
            }
        }
        Ok(result)
    }

    /// Set preference `pref_id`; `None` clears it.
    pub fn data_set_user_preference(&self, pref_id: u32, value: Option<&str>) -> Result<()> {
        preferences::validate_id(pref_id)?;
        preferences::validate_value(value)?;
        self.invoke(
            &methods::DATA_SET_USER_PREFERENCE,
            [
                ("pref_id", pref_id.to_string()),
                ("value", preferences::encode(value)),
            ],
        )?;
        Ok(())
    }

    /// Set several preferences at once. With `replace`, preferences not
    /// listed are removed.
    pub fn data_set_user_preferences(
        &self,
        values: &BTreeMap<u32, Option<String>>,
        replace: bool,
    ) -> Result<()> {
        let mut encoded = Map::new();
        for (pref_id, value) in values {
            preferences::validate_id(*pref_id)?;
            preferences::validate_value(value.as_deref())?;
            encoded.insert(
                pref_id.to_string(),
                Value::String(preferences::encode(value.as_deref())),
            );
        }

        let mut params = vec![("values", Value::Object(encoded).to_string())];
        if replace {
            params.push(("replace", "true".to_string()));
        }
        self.invoke(&methods::DATA_SET_USER_PREFERENCES, params)?;
        Ok(())
    }
}
