//! Protocol facade: goal state synchronization and status reporting.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::cache::DocumentCache;
use crate::config::{ProtocolSettings, WIRE_PROTOCOL_VERSION};
use crate::crypto::{
    resolve_certificates, CertificateDecoder, OpensslCertificateDecoder, TransportCertificate,
};
use crate::transport::{Transport, TransportResponse};
use crate::types::{Certificate, DocumentKind, ProtocolError, Result, VmInfo};
use crate::utils::fileutils::{FsHandlerArtifacts, HandlerArtifacts};
use crate::wireserver::certificates::CertificatesConfig;
use crate::wireserver::extensions_config::{Extension, ExtensionsConfig};
use crate::wireserver::goal_state::GoalState;
use crate::wireserver::health::Health;
use crate::wireserver::hosting_env::HostingEnvironmentConfig;
use crate::wireserver::manifest::{Manifest, ResolvedPackage};
use crate::wireserver::shared_config::SharedConfig;
use crate::wireserver::status::{AggregateStatusDocument, HandlerAggregateStatus};
use crate::wireserver::telemetry::{Param, TelemetryData};
use crate::wireserver::version_info::VersionInfo;

enum PushVerb {
    Post,
    Put,
}

/// Protocol engine instance; one per agent process.
///
/// Every operation runs its I/O inline and returns only after completion or
/// final failure; nothing continues in the background. `refresh` and the
/// report operations take `&mut self`, so a shared engine is serialized by
/// construction.
pub struct Protocol {
    settings: ProtocolSettings,
    transport: Arc<dyn Transport>,
    cache: DocumentCache,
    decoder: Box<dyn CertificateDecoder>,
    artifacts: Box<dyn HandlerArtifacts>,
    transport_cert: TransportCertificate,
    negotiated: bool,
    last_incarnation: Option<u32>,
    goal_state: Option<GoalState>,
    hosting_env: Option<HostingEnvironmentConfig>,
    shared_config: Option<SharedConfig>,
    certificates: HashMap<String, Certificate>,
    extensions_config: ExtensionsConfig,
    manifests: HashMap<String, Manifest>,
}

impl Protocol {
    pub fn new(settings: ProtocolSettings, transport: Arc<dyn Transport>) -> Result<Self> {
        let cache = DocumentCache::open(&settings.lib_dir)?;
        let transport_cert = TransportCertificate::in_dir(&settings.lib_dir);
        let decoder = Box::new(OpensslCertificateDecoder::new(&settings.lib_dir));
        let artifacts = Box::new(FsHandlerArtifacts::new(&settings.lib_dir));
        Ok(Protocol {
            settings,
            transport,
            cache,
            decoder,
            artifacts,
            transport_cert,
            negotiated: false,
            last_incarnation: None,
            goal_state: None,
            hosting_env: None,
            shared_config: None,
            certificates: HashMap::new(),
            extensions_config: ExtensionsConfig::default(),
            manifests: HashMap::new(),
        })
    }

    /// Replaces the certificate decoder used for bundle resolution.
    pub fn with_decoder(mut self, decoder: Box<dyn CertificateDecoder>) -> Self {
        self.decoder = decoder;
        self
    }

    /// Replaces the handler artifact source used for status aggregation.
    pub fn with_artifacts(mut self, artifacts: Box<dyn HandlerArtifacts>) -> Self {
        self.artifacts = artifacts;
        self
    }

    // ---- synchronization -------------------------------------------------

    /// Synchronizes the engine with the fabric's current goal state.
    ///
    /// The goal state document is always fetched fresh. Sub-documents are
    /// reloaded only when the incarnation moved since the last clean load,
    /// and then cache first. Certificates and extensions failures are
    /// scoped: the remaining documents stay usable and the first error is
    /// returned after every load was attempted.
    pub async fn refresh(&mut self) -> Result<()> {
        self.negotiate().await?;

        let goal_state = self.fetch_goal_state().await?;
        let incarnation = goal_state.incarnation;
        if self.last_incarnation == Some(incarnation) {
            debug!(incarnation, "incarnation unchanged, reusing loaded documents");
            self.goal_state = Some(goal_state);
            return Ok(());
        }

        info!(incarnation, "loading documents for goal state");
        let outcome = self.load_sub_documents(&goal_state).await;
        self.goal_state = Some(goal_state);
        self.manifests.clear();
        if outcome.is_ok() {
            // A partial load keeps the cursor back so the next refresh
            // retries the failed documents for this incarnation.
            self.last_incarnation = Some(incarnation);
        }
        outcome
    }

    async fn negotiate(&mut self) -> Result<()> {
        if self.negotiated {
            return Ok(());
        }
        let url = self.uri("?comp=versions");
        let response = self.fetch(&url, &[]).await?;
        let info = VersionInfo::parse(&response.text())?;
        if !info.supports(WIRE_PROTOCOL_VERSION) {
            return Err(ProtocolError::VersionUnsupported {
                version: WIRE_PROTOCOL_VERSION.to_string(),
            });
        }
        if info.preferred() != WIRE_PROTOCOL_VERSION {
            debug!(
                preferred = info.preferred(),
                speaking = WIRE_PROTOCOL_VERSION,
                "fabric prefers a newer wire version"
            );
        }
        self.negotiated = true;
        Ok(())
    }

    async fn fetch_goal_state(&self) -> Result<GoalState> {
        let url = self.uri("machine?comp=goalstate");
        let response = self.fetch(&url, &[]).await?;
        let xml = response.text();
        let goal_state = GoalState::parse(&xml)?;
        self.store_document(
            &DocumentKind::GoalState,
            goal_state.incarnation,
            xml.as_bytes(),
        )?;
        Ok(goal_state)
    }

    async fn load_sub_documents(&mut self, goal_state: &GoalState) -> Result<()> {
        let incarnation = goal_state.incarnation;
        let config = goal_state.configuration();
        let mut first_error: Option<ProtocolError> = None;

        match self
            .load_and_parse(
                DocumentKind::HostingEnvironmentConfig,
                incarnation,
                &config.hosting_environment_config,
                &[],
                HostingEnvironmentConfig::parse,
            )
            .await
        {
            Ok(doc) => self.hosting_env = Some(doc),
            Err(err) => {
                warn!(error = %err, "hosting environment config unavailable");
                self.hosting_env = None;
                first_error.get_or_insert(err);
            }
        }

        match self
            .load_and_parse(
                DocumentKind::SharedConfig,
                incarnation,
                &config.shared_config,
                &[],
                SharedConfig::parse,
            )
            .await
        {
            Ok(doc) => self.shared_config = Some(doc),
            Err(err) => {
                warn!(error = %err, "shared config unavailable");
                self.shared_config = None;
                first_error.get_or_insert(err);
            }
        }

        match config.certificates.as_deref() {
            Some(uri) if !uri.is_empty() => {
                match self.load_certificates(incarnation, uri).await {
                    Ok(certs) => self.certificates = certs,
                    Err(err) => {
                        warn!(error = %err, "certificates unavailable");
                        self.certificates = HashMap::new();
                        first_error.get_or_insert(err);
                    }
                }
            }
            _ => self.certificates = HashMap::new(),
        }

        match config.extensions_config.as_deref() {
            Some(uri) if !uri.is_empty() => {
                match self
                    .load_and_parse(
                        DocumentKind::ExtensionsConfig,
                        incarnation,
                        uri,
                        &[],
                        ExtensionsConfig::parse,
                    )
                    .await
                {
                    Ok(doc) => self.extensions_config = doc,
                    Err(err) => {
                        warn!(error = %err, "extensions config unavailable");
                        self.extensions_config = ExtensionsConfig::default();
                        first_error.get_or_insert(err);
                    }
                }
            }
            _ => self.extensions_config = ExtensionsConfig::default(),
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn load_certificates(
        &self,
        incarnation: u32,
        uri: &str,
    ) -> Result<HashMap<String, Certificate>> {
        // The fabric encrypts the bundle to our transport certificate, sent
        // base64 in this header.
        let auth = self.certificates_auth_header();
        let mut extra: Vec<(&str, &str)> = Vec::new();
        if let Some(body) = auth.as_deref() {
            extra.push(("x-ms-guest-agent-public-x509-cert", body));
        }
        let doc = self
            .load_and_parse(
                DocumentKind::Certificates,
                incarnation,
                uri,
                &extra,
                CertificatesConfig::parse,
            )
            .await?;
        match resolve_certificates(Some(&doc), self.decoder.as_ref()) {
            Ok(certs) => Ok(certs),
            Err(err) => {
                // An undecodable bundle is dropped like an unparsable
                // document, so a later refresh refetches it.
                self.cache.invalidate(&DocumentKind::Certificates, incarnation);
                Err(err)
            }
        }
    }

    fn certificates_auth_header(&self) -> Option<String> {
        match self
            .transport_cert
            .ensure()
            .and_then(|_| self.transport_cert.public_body_base64())
        {
            Ok(body) => Some(body),
            Err(err) => {
                warn!(error = %err, "transport certificate unavailable, fetching without header");
                None
            }
        }
    }

    async fn load_and_parse<T>(
        &self,
        kind: DocumentKind,
        incarnation: u32,
        uri: &str,
        extra_headers: &[(&str, &str)],
        parse: fn(&str) -> Result<T>,
    ) -> Result<T> {
        let xml = self
            .load_document(&kind, incarnation, uri, extra_headers)
            .await?;
        match parse(&xml) {
            Ok(doc) => Ok(doc),
            Err(err) => {
                // Keeping unparsable bytes would pin the failure until the
                // next incarnation; drop them so a refresh refetches.
                self.cache.invalidate(&kind, incarnation);
                Err(err)
            }
        }
    }

    async fn load_document(
        &self,
        kind: &DocumentKind,
        incarnation: u32,
        uri: &str,
        extra_headers: &[(&str, &str)],
    ) -> Result<String> {
        if let Some(bytes) = self.cache.get(kind, incarnation) {
            debug!(kind = %kind, incarnation, "serving document from cache");
            return Ok(String::from_utf8_lossy(&bytes).into_owned());
        }
        let response = self.fetch(uri, extra_headers).await?;
        self.store_document(kind, incarnation, &response.body)?;
        Ok(response.text())
    }

    fn store_document(&self, kind: &DocumentKind, incarnation: u32, bytes: &[u8]) -> Result<()> {
        match self.cache.put(kind, incarnation, bytes) {
            Err(ProtocolError::CacheCorruption { .. }) => {
                // The conflicting entry is gone; keep the bytes we fetched.
                self.cache.put(kind, incarnation, bytes)
            }
            other => other,
        }
    }

    // ---- accessors -------------------------------------------------------

    /// Identity of the VM under the current goal state; `None` until a
    /// refresh loaded the hosting environment document.
    pub fn vm_info(&self) -> Option<VmInfo> {
        let goal_state = self.goal_state.as_ref()?;
        let hosting_env = self.hosting_env.as_ref()?;
        Some(VmInfo {
            vm_name: hosting_env.vm_name().to_string(),
            deployment_name: hosting_env.deployment_name().to_string(),
            role_name: hosting_env.role_name().to_string(),
            role_instance_id: goal_state.role_instance().instance_id.clone(),
            container_id: goal_state.container.container_id.clone(),
            incarnation: goal_state.incarnation,
        })
    }

    /// Certificates resolved from the current goal state, by thumbprint.
    pub fn certs(&self) -> &HashMap<String, Certificate> {
        &self.certificates
    }

    /// Extensions requested by the current goal state.
    pub fn extensions(&self) -> &[Extension] {
        &self.extensions_config.extensions
    }

    pub fn shared_config(&self) -> Option<&SharedConfig> {
        self.shared_config.as_ref()
    }

    pub fn goal_state(&self) -> Option<&GoalState> {
        self.goal_state.as_ref()
    }

    // ---- version resolution ----------------------------------------------

    /// Resolves the installable package for one extension.
    ///
    /// The manifest is fetched at most once per extension and incarnation,
    /// cached on disk like any other document. When the primary location
    /// fails its retry budget the failover location is tried.
    pub async fn resolve_package(
        &mut self,
        extension: &str,
        requested: &str,
    ) -> Result<ResolvedPackage> {
        if let Some(manifest) = self.manifests.get(extension) {
            return manifest.resolve_version(requested);
        }
        let manifest = self.fetch_manifest(extension, requested).await?;
        let resolved = manifest.resolve_version(requested);
        self.manifests.insert(extension.to_string(), manifest);
        resolved
    }

    async fn fetch_manifest(&self, extension: &str, requested: &str) -> Result<Manifest> {
        let goal_state = self
            .goal_state
            .as_ref()
            .ok_or(ProtocolError::NotSynchronized)?;
        let incarnation = goal_state.incarnation;

        let ext = self
            .extensions_config
            .extensions
            .iter()
            .find(|e| e.name == extension)
            .ok_or_else(|| ProtocolError::NoCompatibleVersion {
                extension: extension.to_string(),
                requested: requested.to_string(),
            })?;

        let kind = DocumentKind::Manifest(extension.to_string());
        let xml = match self
            .load_document(&kind, incarnation, &ext.manifest_uri, &[])
            .await
        {
            Ok(xml) => xml,
            Err(err) => match ext.failover_manifest_uri.as_deref() {
                Some(failover) => {
                    warn!(
                        extension,
                        error = %err,
                        "primary manifest location failed, trying failover"
                    );
                    self.load_document(&kind, incarnation, failover, &[]).await?
                }
                None => return Err(err),
            },
        };

        match Manifest::parse(&xml, extension) {
            Ok(manifest) => Ok(manifest),
            Err(err) => {
                self.cache.invalidate(&kind, incarnation);
                Err(err)
            }
        }
    }

    // ---- reporting -------------------------------------------------------

    /// Reports provisioning health to the fabric control endpoint.
    ///
    /// An empty `sub_status` marks a terminal state; a non-empty one (for
    /// example `Provisioning`) reports progress.
    pub async fn report_provision_status(
        &mut self,
        state: &str,
        sub_status: &str,
        description: &str,
    ) -> Result<()> {
        let goal_state = self
            .goal_state
            .as_ref()
            .ok_or(ProtocolError::NotSynchronized)?;
        let payload = Health::provisioning(goal_state, state, sub_status, description);
        let body = payload.to_xml()?;
        let url = self.uri("machine?comp=health");
        self.push(
            PushVerb::Post,
            &url,
            &[("Content-Type", "text/xml;charset=utf-8")],
            &body,
            false,
        )
        .await
    }

    /// Uploads the aggregate agent and extension status document to the
    /// SAS-signed blob named by the current goal state.
    ///
    /// Without an upload destination the report is skipped; a 401/403 from
    /// the blob endpoint means the signed URI expired and only a goal state
    /// refresh can mint a new one.
    pub async fn report_agent_status(
        &mut self,
        version: &str,
        status: &str,
        message: &str,
    ) -> Result<()> {
        if self.goal_state.is_none() {
            return Err(ProtocolError::NotSynchronized);
        }
        let Some(blob_uri) = self.extensions_config.status_upload_blob.clone() else {
            info!("goal state names no status upload blob, skipping agent status report");
            return Ok(());
        };

        let handlers = self.collect_handler_statuses();
        let document = AggregateStatusDocument::new(version, status, message, handlers);
        let body = document.to_json()?;
        self.push(
            PushVerb::Put,
            &blob_uri,
            &[
                ("Content-Type", "application/json"),
                ("x-ms-blob-type", "BlockBlob"),
            ],
            &body,
            true,
        )
        .await
    }

    /// Posts a telemetry event to the fabric.
    pub async fn report_event(
        &mut self,
        event_id: &str,
        event_name: &str,
        extra: Vec<Param>,
    ) -> Result<()> {
        let goal_state = self
            .goal_state
            .as_ref()
            .ok_or(ProtocolError::NotSynchronized)?;
        let event = TelemetryData::event(
            goal_state,
            &self.settings.agent_name,
            &self.settings.agent_version,
            event_id,
            event_name,
            extra,
        );
        let body = event.to_xml()?;
        let url = self.uri("machine?comp=telemetrydata");
        self.push(
            PushVerb::Post,
            &url,
            &[("Content-Type", "text/xml;charset=utf-8")],
            &body,
            false,
        )
        .await
    }

    fn collect_handler_statuses(&self) -> Vec<HandlerAggregateStatus> {
        let mut entries = Vec::new();
        for ext in &self.extensions_config.extensions {
            for instance in &ext.instances {
                let version = &instance.requested_version;
                let state = self.artifacts.handler_state(&ext.name, version);
                if state.as_deref().map(str::trim) != Some("Enabled") {
                    debug!(extension = %ext.name, "handler not enabled, not reported");
                    continue;
                }
                if !self.artifacts.is_responsive(&ext.name, version) {
                    warn!(extension = %ext.name, "handler unresponsive, not reported");
                    continue;
                }
                let Some(raw_status) =
                    self.artifacts
                        .status(&ext.name, version, &instance.sequence_number)
                else {
                    debug!(
                        extension = %ext.name,
                        seq_no = %instance.sequence_number,
                        "no status artifact yet"
                    );
                    continue;
                };
                let status = match serde_json::from_str(&raw_status) {
                    Ok(value) => value,
                    Err(err) => {
                        warn!(
                            extension = %ext.name,
                            error = %err,
                            "status artifact is not valid json, not reported"
                        );
                        continue;
                    }
                };
                let heartbeat = self
                    .artifacts
                    .heartbeat(&ext.name, version)
                    .and_then(|raw| serde_json::from_str(&raw).ok());
                entries.push(HandlerAggregateStatus {
                    handler_name: ext.name.clone(),
                    handler_version: version.clone(),
                    sequence_number: instance.sequence_number.clone(),
                    status,
                    heartbeat,
                });
            }
        }
        entries
    }

    // ---- transport helpers -----------------------------------------------

    fn uri(&self, path_and_query: &str) -> String {
        format!("http://{}/{}", self.settings.endpoint, path_and_query)
    }

    /// GET with the standard wire headers and the pull retry budget.
    async fn fetch(&self, url: &str, extra: &[(&str, &str)]) -> Result<TransportResponse> {
        let user_agent = self.settings.user_agent();
        let mut headers: Vec<(&str, &str)> = vec![
            ("x-ms-version", WIRE_PROTOCOL_VERSION),
            ("x-ms-agent-name", &self.settings.agent_name),
            ("User-Agent", &user_agent),
        ];
        headers.extend_from_slice(extra);

        let mut attempts = 0;
        loop {
            attempts += 1;
            match self.transport.get(url, &headers).await {
                Ok(response) if response.is_success() => return Ok(response),
                Ok(response) => {
                    if attempts >= self.settings.fetch_retries {
                        return Err(ProtocolError::Transport {
                            attempts,
                            reason: format!("HTTP {} from {url}", response.status),
                        });
                    }
                    debug!(url, status = response.status, attempts, "fetch failed, retrying");
                }
                Err(fault) => {
                    if attempts >= self.settings.fetch_retries {
                        return Err(ProtocolError::Transport {
                            attempts,
                            reason: fault.to_string(),
                        });
                    }
                    debug!(url, error = %fault, attempts, "fetch failed, retrying");
                }
            }
            sleep(self.settings.retry_delay).await;
        }
    }

    /// POST/PUT with the standard wire headers and the push retry budget.
    ///
    /// `sas_destination` marks blob uploads, where authorization rejections
    /// are terminal rather than retryable.
    async fn push(
        &self,
        verb: PushVerb,
        url: &str,
        extra: &[(&str, &str)],
        body: &str,
        sas_destination: bool,
    ) -> Result<()> {
        let user_agent = self.settings.user_agent();
        let mut headers: Vec<(&str, &str)> = vec![
            ("x-ms-version", WIRE_PROTOCOL_VERSION),
            ("x-ms-agent-name", &self.settings.agent_name),
            ("User-Agent", &user_agent),
        ];
        headers.extend_from_slice(extra);

        let mut attempts = 0;
        loop {
            attempts += 1;
            let outcome = match verb {
                PushVerb::Post => self.transport.post(url, &headers, body).await,
                PushVerb::Put => self.transport.put(url, &headers, body).await,
            };
            match outcome {
                Ok(response) if response.is_success() => {
                    debug!(url, status = response.status, "report acknowledged");
                    return Ok(());
                }
                Ok(response)
                    if sas_destination && (response.status == 401 || response.status == 403) =>
                {
                    warn!(url, status = response.status, "signed uri rejected");
                    return Err(ProtocolError::StaleSasUri {
                        status: response.status,
                    });
                }
                Ok(response) => {
                    if attempts >= self.settings.report_retries {
                        return Err(ProtocolError::ReportFailed { attempts });
                    }
                    debug!(url, status = response.status, attempts, "report not accepted, retrying");
                }
                Err(fault) => {
                    if attempts >= self.settings.report_retries {
                        return Err(ProtocolError::ReportFailed { attempts });
                    }
                    debug!(url, error = %fault, attempts, "report failed, retrying");
                }
            }
            sleep(self.settings.retry_delay).await;
        }
    }
}
