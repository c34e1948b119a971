//! Azure Resource Manager REST client
//!
//! A thin client over the ARM REST API covering exactly the operations in
//! [`AzureOperations`]. Every call is wrapped in the transient retry policy;
//! disk and VHD deletes are additionally retried while the disk is still
//! attached to a VM. Long-running operations are polled to completion.

use super::context::{AzureContext, MANAGEMENT_SCOPE, STORAGE_SCOPE};
use super::error::{AzureError, classify_cloud_error, ignore_not_found};
use super::operations::AzureOperations;
use super::retry::{RetryPolicies, retry_disk_delete, retry_transient};
use super::types::{
    IpAllocationMethod, IpConfiguration, NetworkInterface, NetworkSecurityGroup, StorageProfile,
    SubResource, VirtualMachine,
};
use crate::config::ProviderConfig;
use crate::wait::{PollConfig, PollStatus, parse_retry_after, poll_until_done};
use anyhow::{Context, Result};
use azsandbox_common::{RuleAccess, RuleDirection, RuleProtocol, SecurityRule};
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Method, Response, StatusCode, Url};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

const COMPUTE_API_VERSION: &str = "2023-03-01";
const DISK_API_VERSION: &str = "2023-04-02";
const NETWORK_API_VERSION: &str = "2023-05-01";
const STORAGE_API_VERSION: &str = "2021-08-06";

const ASYNC_OPERATION_HEADER: &str = "azure-asyncoperation";
const STORAGE_ERROR_CODE_HEADER: &str = "x-ms-error-code";

/// Resource a request is about, for error messages and classification
#[derive(Debug, Clone, Copy)]
struct Target<'a> {
    kind: &'static str,
    name: &'a str,
}

impl<'a> Target<'a> {
    fn new(kind: &'static str, name: &'a str) -> Self {
        Self { kind, name }
    }
}

/// ARM REST client
#[derive(Debug, Clone)]
pub struct AzureClient {
    ctx: AzureContext,
    retry: RetryPolicies,
    poll: PollConfig,
    cancel: Option<CancellationToken>,
}

impl AzureClient {
    pub fn new(ctx: AzureContext) -> Self {
        Self {
            ctx,
            retry: RetryPolicies::default(),
            poll: PollConfig::default(),
            cancel: None,
        }
    }

    /// Create a client from provider configuration
    pub fn from_config(config: &ProviderConfig) -> Result<Self> {
        let ctx = AzureContext::new(config.azure.clone())?;
        Ok(Self::new(ctx)
            .with_retry(config.retry.policies())
            .with_poll_config(config.poll.clone()))
    }

    pub fn with_retry(mut self, retry: RetryPolicies) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_poll_config(mut self, poll: PollConfig) -> Self {
        self.poll = poll;
        self
    }

    /// Stop waiting on long-running operations once `token` is cancelled
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn context(&self) -> &AzureContext {
        &self.ctx
    }

    fn resource_url(
        &self,
        resource_group: &str,
        provider: &str,
        path: &[&str],
        api_version: &str,
    ) -> Result<Url> {
        let mut url = Url::parse(self.ctx.management_endpoint())
            .context("Invalid management endpoint")?;
        url.path_segments_mut()
            .map_err(|()| anyhow::anyhow!("Management endpoint cannot be a base URL"))?
            .pop_if_empty()
            .extend([
                "subscriptions",
                self.ctx.subscription_id(),
                "resourceGroups",
                resource_group,
                "providers",
                provider,
            ])
            .extend(path);
        url.query_pairs_mut().append_pair("api-version", api_version);
        Ok(url)
    }

    fn vm_url(&self, resource_group: &str, vm_name: &str) -> Result<Url> {
        self.resource_url(
            resource_group,
            "Microsoft.Compute",
            &["virtualMachines", vm_name],
            COMPUTE_API_VERSION,
        )
    }

    fn disk_url(&self, resource_group: &str, disk_name: &str) -> Result<Url> {
        self.resource_url(
            resource_group,
            "Microsoft.Compute",
            &["disks", disk_name],
            DISK_API_VERSION,
        )
    }

    fn network_url(&self, resource_group: &str, path: &[&str]) -> Result<Url> {
        self.resource_url(resource_group, "Microsoft.Network", path, NETWORK_API_VERSION)
    }

    /// Send an authenticated ARM request, mapping error responses to [`AzureError`]
    async fn send(
        &self,
        method: Method,
        url: Url,
        body: Option<&Value>,
        target: Target<'_>,
    ) -> Result<Response> {
        let token = self.ctx.token(MANAGEMENT_SCOPE).await?;
        let mut request = self
            .ctx
            .http()
            .request(method.clone(), url)
            .bearer_auth(token);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.with_context(|| {
            format!("{} request for {} '{}' failed", method, target.kind, target.name)
        })?;

        if !response.status().is_success() {
            return Err(error_from_response(response, target).await.into());
        }
        Ok(response)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url, target: Target<'_>) -> Result<T> {
        let response = self.send(Method::GET, url, None, target).await?;
        response
            .json()
            .await
            .with_context(|| format!("Failed to parse {} '{}'", target.kind, target.name))
    }

    /// GET every page of a list endpoint
    async fn get_all_pages<T: DeserializeOwned>(
        &self,
        url: Url,
        target: Target<'_>,
    ) -> Result<Vec<T>> {
        let mut items = Vec::new();
        let mut next = Some(url);
        while let Some(url) = next.take() {
            let page: Page<T> = self.get_json(url, target).await?;
            items.extend(page.value);
            next = page
                .next_link
                .filter(|link| !link.is_empty())
                .map(|link| Url::parse(&link))
                .transpose()
                .context("Invalid nextLink in list response")?;
        }
        Ok(items)
    }

    async fn put_and_wait(&self, url: Url, body: &Value, target: Target<'_>) -> Result<()> {
        let response = self.send(Method::PUT, url, Some(body), target).await?;
        self.wait_for_completion(response, target).await
    }

    async fn delete_and_wait(&self, url: Url, target: Target<'_>) -> Result<()> {
        let response = self.send(Method::DELETE, url, None, target).await?;
        self.wait_for_completion(response, target).await
    }

    /// Poll a 201/202 response's operation URL until it finishes
    async fn wait_for_completion(&self, response: Response, target: Target<'_>) -> Result<()> {
        let status = response.status();
        if status != StatusCode::CREATED && status != StatusCode::ACCEPTED {
            return Ok(());
        }

        let headers = response.headers();
        if let Some(operation_url) = header_str(headers, ASYNC_OPERATION_HEADER) {
            let operation_url = Url::parse(&operation_url)
                .context("Invalid Azure-AsyncOperation header")?;
            debug!(kind = target.kind, name = target.name, "Polling async operation");
            return poll_until_done(&self.poll, self.cancel.as_ref(), target.kind, || {
                self.poll_async_operation(operation_url.clone(), target)
            })
            .await;
        }

        if let Some(location) = header_str(headers, reqwest::header::LOCATION.as_str()) {
            let location = Url::parse(&location).context("Invalid Location header")?;
            debug!(kind = target.kind, name = target.name, "Polling operation location");
            return poll_until_done(&self.poll, self.cancel.as_ref(), target.kind, || {
                self.poll_location(location.clone(), target)
            })
            .await;
        }

        Ok(())
    }

    async fn poll_async_operation(&self, url: Url, target: Target<'_>) -> Result<PollStatus> {
        let response = self
            .send(Method::GET, url, None, target)
            .await
            .map_err(|e| operation_status_error(e, target))?;
        let retry_after = retry_after(response.headers());
        let operation: OperationStatus = response
            .json()
            .await
            .context("Failed to parse async operation status")?;

        match operation.status.as_str() {
            "Succeeded" => Ok(PollStatus::Done),
            "Failed" | "Canceled" => {
                let detail = operation.error.unwrap_or_default();
                let message = detail
                    .message
                    .unwrap_or_else(|| format!("Operation {}", operation.status));
                Err(classify_cloud_error(
                    target.kind,
                    target.name,
                    None,
                    detail.code.as_deref(),
                    &message,
                )
                .into())
            }
            _ => Ok(PollStatus::Pending { retry_after }),
        }
    }

    async fn poll_location(&self, url: Url, target: Target<'_>) -> Result<PollStatus> {
        let response = self
            .send(Method::GET, url, None, target)
            .await
            .map_err(|e| operation_status_error(e, target))?;
        if response.status() == StatusCode::ACCEPTED {
            return Ok(PollStatus::Pending {
                retry_after: retry_after(response.headers()),
            });
        }
        Ok(PollStatus::Done)
    }

    async fn get_vm_once(&self, resource_group: &str, vm_name: &str) -> Result<VirtualMachine> {
        let vm: ArmVirtualMachine = self
            .get_json(
                self.vm_url(resource_group, vm_name)?,
                Target::new("virtual machine", vm_name),
            )
            .await?;
        Ok(vm.into())
    }

    async fn get_network_interface_once(
        &self,
        resource_group: &str,
        interface_name: &str,
    ) -> Result<NetworkInterface> {
        let nic: ArmNetworkInterface = self
            .get_json(
                self.network_url(resource_group, &["networkInterfaces", interface_name])?,
                Target::new("network interface", interface_name),
            )
            .await?;
        Ok(nic.into())
    }

    async fn get_security_group_once(
        &self,
        resource_group: &str,
        nsg_name: &str,
    ) -> Result<NetworkSecurityGroup> {
        let nsg: ArmSecurityGroup = self
            .get_json(
                self.network_url(resource_group, &["networkSecurityGroups", nsg_name])?,
                Target::new("network security group", nsg_name),
            )
            .await?;
        Ok(nsg.into())
    }

    async fn delete_vhd_once(&self, vhd_uri: &str) -> Result<()> {
        let url = Url::parse(vhd_uri).with_context(|| format!("Invalid VHD URI '{vhd_uri}'"))?;
        let target = Target::new("vhd", vhd_uri);
        let token = self.ctx.token(STORAGE_SCOPE).await?;

        let response = self
            .ctx
            .http()
            .delete(url)
            .bearer_auth(token)
            .header("x-ms-version", STORAGE_API_VERSION)
            .header("x-ms-delete-snapshots", "include")
            .send()
            .await
            .with_context(|| format!("DELETE request for vhd '{vhd_uri}' failed"))?;

        if !response.status().is_success() {
            return Err(error_from_response(response, target).await.into());
        }
        Ok(())
    }

}

impl AzureOperations for AzureClient {
    async fn get_vm(&self, resource_group: &str, vm_name: &str) -> Result<VirtualMachine> {
        retry_transient(self.retry.transient, "get_vm", || {
            self.get_vm_once(resource_group, vm_name)
        })
        .await
    }

    async fn delete_vm(&self, resource_group: &str, vm_name: &str) -> Result<()> {
        info!(vm_name = %vm_name, "Deleting virtual machine");
        retry_transient(self.retry.transient, "delete_vm", || async {
            let url = self.vm_url(resource_group, vm_name)?;
            self.delete_and_wait(url, Target::new("virtual machine", vm_name))
                .await
        })
        .await
    }

    async fn get_network_interface(
        &self,
        resource_group: &str,
        interface_name: &str,
    ) -> Result<NetworkInterface> {
        retry_transient(self.retry.transient, "get_network_interface", || {
            self.get_network_interface_once(resource_group, interface_name)
        })
        .await
    }

    async fn delete_network_interface(
        &self,
        resource_group: &str,
        interface_name: &str,
    ) -> Result<()> {
        retry_transient(self.retry.transient, "delete_network_interface", || async {
            let url = self.network_url(resource_group, &["networkInterfaces", interface_name])?;
            self.delete_and_wait(url, Target::new("network interface", interface_name))
                .await
        })
        .await
    }

    async fn delete_public_ip(&self, resource_group: &str, public_ip_name: &str) -> Result<()> {
        retry_transient(self.retry.transient, "delete_public_ip", || async {
            let url = self.network_url(resource_group, &["publicIPAddresses", public_ip_name])?;
            self.delete_and_wait(url, Target::new("public ip", public_ip_name))
                .await
        })
        .await
    }

    async fn delete_disk(&self, resource_group: &str, disk_name: &str) -> Result<()> {
        retry_disk_delete(self.retry, "delete_disk", || async {
            let url = self.disk_url(resource_group, disk_name)?;
            self.delete_and_wait(url, Target::new("disk", disk_name))
                .await
        })
        .await
    }

    async fn delete_vhd(&self, vhd_uri: &str) -> Result<()> {
        retry_disk_delete(self.retry, "delete_vhd", || self.delete_vhd_once(vhd_uri)).await
    }

    async fn get_security_group(
        &self,
        resource_group: &str,
        nsg_name: &str,
    ) -> Result<NetworkSecurityGroup> {
        retry_transient(self.retry.transient, "get_security_group", || {
            self.get_security_group_once(resource_group, nsg_name)
        })
        .await
    }

    async fn create_security_group(
        &self,
        resource_group: &str,
        nsg_name: &str,
        location: &str,
    ) -> Result<NetworkSecurityGroup> {
        info!(nsg_name = %nsg_name, location = %location, "Creating network security group");
        let body = json!({ "location": location, "properties": {} });
        retry_transient(self.retry.transient, "create_security_group", || async {
            let url = self.network_url(resource_group, &["networkSecurityGroups", nsg_name])?;
            self.put_and_wait(url, &body, Target::new("network security group", nsg_name))
                .await
        })
        .await?;

        self.get_security_group(resource_group, nsg_name).await
    }

    async fn delete_security_group(&self, resource_group: &str, nsg_name: &str) -> Result<()> {
        retry_transient(self.retry.transient, "delete_security_group", || async {
            let url = self.network_url(resource_group, &["networkSecurityGroups", nsg_name])?;
            self.delete_and_wait(url, Target::new("network security group", nsg_name))
                .await
        })
        .await
    }

    async fn security_group_exists(&self, resource_group: &str, nsg_name: &str) -> Result<bool> {
        Ok(ignore_not_found(self.get_security_group(resource_group, nsg_name).await)?.is_some())
    }

    async fn create_rule(
        &self,
        resource_group: &str,
        nsg_name: &str,
        rule: &SecurityRule,
    ) -> Result<()> {
        let body = rule_body(rule);
        retry_transient(self.retry.transient, "create_rule", || async {
            let url = self.network_url(
                resource_group,
                &["networkSecurityGroups", nsg_name, "securityRules", rule.name.as_str()],
            )?;
            self.put_and_wait(url, &body, Target::new("security rule", &rule.name))
                .await
        })
        .await
    }

    async fn delete_rule(
        &self,
        resource_group: &str,
        nsg_name: &str,
        rule_name: &str,
    ) -> Result<()> {
        retry_transient(self.retry.transient, "delete_rule", || async {
            let url = self.network_url(
                resource_group,
                &["networkSecurityGroups", nsg_name, "securityRules", rule_name],
            )?;
            self.delete_and_wait(url, Target::new("security rule", rule_name))
                .await
        })
        .await
    }

    async fn list_rules(&self, resource_group: &str, nsg_name: &str) -> Result<Vec<SecurityRule>> {
        retry_transient(self.retry.transient, "list_rules", || async {
            let url = self.network_url(
                resource_group,
                &["networkSecurityGroups", nsg_name, "securityRules"],
            )?;
            let rules: Vec<ArmSecurityRule> = self
                .get_all_pages(url, Target::new("network security group", nsg_name))
                .await?;
            Ok(rules.into_iter().map(SecurityRule::from).collect())
        })
        .await
    }
}

async fn error_from_response(response: Response, target: Target<'_>) -> AzureError {
    let status = response.status().as_u16();
    let header_code = header_str(response.headers(), STORAGE_ERROR_CODE_HEADER);
    let body = response.text().await.unwrap_or_default();

    let detail = serde_json::from_str::<ArmErrorBody>(&body)
        .ok()
        .map(|b| b.error);
    let code = detail
        .as_ref()
        .and_then(|d| d.code.clone())
        .or(header_code);
    let message = detail.and_then(|d| d.message).unwrap_or(body);

    classify_cloud_error(target.kind, target.name, Some(status), code.as_deref(), &message)
}

/// A missing status URL says nothing about the target resource itself
fn operation_status_error(error: anyhow::Error, target: Target<'_>) -> anyhow::Error {
    let missing = error
        .downcast_ref::<AzureError>()
        .is_some_and(AzureError::is_not_found);
    if !missing {
        return error;
    }
    AzureError::Cloud {
        status: Some(404),
        code: None,
        message: format!("Operation status for {} '{}' not found", target.kind, target.name),
    }
    .into()
}

fn header_str(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

fn retry_after(headers: &HeaderMap) -> Option<std::time::Duration> {
    header_str(headers, RETRY_AFTER.as_str()).and_then(|v| parse_retry_after(&v))
}

fn rule_body(rule: &SecurityRule) -> Value {
    json!({
        "properties": {
            "protocol": rule.protocol.as_arm_str(),
            "sourceAddressPrefix": rule.source_address_prefix,
            "sourcePortRange": rule.source_port_range,
            "destinationAddressPrefix": rule.destination_address_prefix,
            "destinationPortRange": rule.destination_port_range,
            "access": match rule.access {
                RuleAccess::Allow => "Allow",
                RuleAccess::Deny => "Deny",
            },
            "priority": rule.priority,
            "direction": match rule.direction {
                RuleDirection::Inbound => "Inbound",
                RuleDirection::Outbound => "Outbound",
            },
        }
    })
}

// ARM wire shapes

#[derive(Debug, Deserialize)]
struct ArmErrorBody {
    error: ArmErrorDetail,
}

#[derive(Debug, Default, Deserialize)]
struct ArmErrorDetail {
    code: Option<String>,
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OperationStatus {
    status: String,
    #[serde(default)]
    error: Option<ArmErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct Page<T> {
    #[serde(default = "Vec::new")]
    value: Vec<T>,
    #[serde(rename = "nextLink", default)]
    next_link: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ArmVirtualMachine {
    name: String,
    id: String,
    properties: ArmVirtualMachineProperties,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ArmVirtualMachineProperties {
    #[serde(default)]
    storage_profile: StorageProfile,
    #[serde(default)]
    network_profile: ArmNetworkProfile,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ArmNetworkProfile {
    #[serde(default)]
    network_interfaces: Vec<SubResource>,
}

impl From<ArmVirtualMachine> for VirtualMachine {
    fn from(vm: ArmVirtualMachine) -> Self {
        Self {
            name: vm.name,
            id: vm.id,
            storage_profile: vm.properties.storage_profile,
            network_interfaces: vm.properties.network_profile.network_interfaces,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ArmNetworkInterface {
    name: String,
    id: String,
    #[serde(default)]
    properties: ArmNetworkInterfaceProperties,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ArmNetworkInterfaceProperties {
    #[serde(default)]
    ip_configurations: Vec<ArmIpConfiguration>,
}

#[derive(Debug, Deserialize)]
struct ArmIpConfiguration {
    name: String,
    #[serde(default)]
    properties: ArmIpConfigurationProperties,
}

#[derive(Debug, Default, Deserialize)]
struct ArmIpConfigurationProperties {
    #[serde(rename = "privateIPAddress", default)]
    private_ip_address: Option<String>,
    #[serde(rename = "privateIPAllocationMethod", default)]
    private_ip_allocation_method: IpAllocationMethod,
    #[serde(rename = "publicIPAddress", default)]
    public_ip_address: Option<SubResource>,
}

impl From<ArmNetworkInterface> for NetworkInterface {
    fn from(nic: ArmNetworkInterface) -> Self {
        Self {
            name: nic.name,
            id: nic.id,
            ip_configurations: nic
                .properties
                .ip_configurations
                .into_iter()
                .map(|c| IpConfiguration {
                    name: c.name,
                    private_ip_address: c.properties.private_ip_address,
                    private_ip_allocation_method: c.properties.private_ip_allocation_method,
                    public_ip_address: c.properties.public_ip_address,
                })
                .collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ArmSecurityGroup {
    name: String,
    id: String,
    #[serde(default)]
    location: String,
    #[serde(default)]
    properties: ArmSecurityGroupProperties,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ArmSecurityGroupProperties {
    #[serde(default)]
    security_rules: Vec<ArmSecurityRule>,
}

#[derive(Debug, Deserialize)]
struct ArmSecurityRule {
    name: String,
    properties: ArmSecurityRuleProperties,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ArmSecurityRuleProperties {
    protocol: String,
    #[serde(default)]
    source_address_prefix: Option<String>,
    #[serde(default)]
    source_port_range: Option<String>,
    #[serde(default)]
    destination_address_prefix: Option<String>,
    #[serde(default)]
    destination_port_range: Option<String>,
    access: String,
    priority: u32,
    direction: String,
}

impl From<ArmSecurityGroup> for NetworkSecurityGroup {
    fn from(nsg: ArmSecurityGroup) -> Self {
        Self {
            name: nsg.name,
            id: nsg.id,
            location: nsg.location,
            security_rules: nsg
                .properties
                .security_rules
                .into_iter()
                .map(SecurityRule::from)
                .collect(),
        }
    }
}

impl From<ArmSecurityRule> for SecurityRule {
    fn from(rule: ArmSecurityRule) -> Self {
        let p = rule.properties;
        let any = || azsandbox_common::rule::ANY.to_string();
        Self {
            name: rule.name,
            access: if p.access.eq_ignore_ascii_case("deny") {
                RuleAccess::Deny
            } else {
                RuleAccess::Allow
            },
            direction: if p.direction.eq_ignore_ascii_case("outbound") {
                RuleDirection::Outbound
            } else {
                RuleDirection::Inbound
            },
            source_address_prefix: p.source_address_prefix.unwrap_or_else(any),
            source_port_range: p.source_port_range.unwrap_or_else(any),
            destination_address_prefix: p.destination_address_prefix.unwrap_or_else(any),
            destination_port_range: p.destination_port_range.unwrap_or_else(any),
            priority: p.priority,
            protocol: RuleProtocol::parse(&p.protocol).unwrap_or_default(),
        }
    }
}
