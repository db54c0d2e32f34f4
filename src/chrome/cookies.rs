use crate::{HarvestError, Result};
use chromiumoxide::cdp::browser_protocol::network::{
    Cookie, CookieSameSite, SetCookieParams, TimeSinceEpoch,
};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionCookie {
    pub name: String,
    pub value: String,
    pub domain: String,
    pub path: String,
    #[serde(default)]
    pub expires: f64,
    #[serde(default)]
    pub http_only: bool,
    #[serde(default)]
    pub secure: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub same_site: Option<String>,
}

impl From<Cookie> for SessionCookie {
    fn from(c: Cookie) -> Self {
        Self {
            name: c.name,
            value: c.value,
            domain: c.domain,
            path: c.path,
            expires: c.expires,
            http_only: c.http_only,
            secure: c.secure,
            same_site: c.same_site.map(|s| format!("{:?}", s)),
        }
    }
}

impl SessionCookie {
    pub fn to_params(&self) -> Result<SetCookieParams> {
        let mut params = SetCookieParams::builder()
            .name(&self.name)
            .value(&self.value)
            .domain(&self.domain)
            .path(&self.path)
            .secure(self.secure)
            .http_only(self.http_only);

        if self.expires > 0.0 {
            params = params.expires(TimeSinceEpoch::new(self.expires));
        }

        if let Some(same_site) = &self.same_site {
            match same_site.parse::<CookieSameSite>() {
                Ok(value) => params = params.same_site(value),
                Err(_) => tracing::debug!(
                    "Ignoring unknown sameSite '{}' on cookie {}",
                    same_site,
                    self.name
                ),
            }
        }

        params
            .build()
            .map_err(|e| HarvestError::Browser(format!("Invalid cookie {}: {}", self.name, e)))
    }
}

/// Session cookies persisted as one JSON file per cookie, named after it.
///
/// Cookie names come from the site, so a name that would resolve outside
/// the session directory is rejected before anything is written.
pub struct SessionStore {
    dir: PathBuf,
}

impl SessionStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn load(&self) -> Result<Vec<SessionCookie>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }

        let mut paths: Vec<PathBuf> = fs::read_dir(&self.dir)?
            .flatten()
            .map(|entry| entry.path())
            .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
            .collect();
        paths.sort();

        let mut cookies = Vec::with_capacity(paths.len());
        for path in paths {
            tracing::debug!("Loading session cookie {}", path.display());
            let content = fs::read_to_string(&path)?;
            cookies.push(serde_json::from_str(&content)?);
        }

        Ok(cookies)
    }

    pub fn save(&self, cookies: &[SessionCookie]) -> Result<usize> {
        for cookie in cookies {
            if !is_safe_file_stem(&cookie.name) {
                return Err(HarvestError::resource(
                    format!("cookie {}", cookie.name),
                    io::Error::new(
                        io::ErrorKind::InvalidInput,
                        "cookie name is not usable as a file name",
                    ),
                ));
            }
        }

        fs::create_dir_all(&self.dir)
            .map_err(|e| HarvestError::resource("session directory", e))?;

        for cookie in cookies {
            let path = self.dir.join(format!("{}.json", cookie.name));
            tracing::debug!("Writing session cookie {}", path.display());
            let json = serde_json::to_string(cookie)?;
            fs::write(&path, json)
                .map_err(|e| HarvestError::resource(format!("cookie {}", cookie.name), e))?;
        }

        Ok(cookies.len())
    }
}

fn is_safe_file_stem(name: &str) -> bool {
    !name.is_empty() && !name.contains("..") && !name.contains(['/', '\\', '\0'])
}
