use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{ComplianceError, Result};

const SIMULATION_GATEWAY: &str = "https://gw-fatoora.zatca.gov.sa/e-invoicing/simulation";
const CORE_GATEWAY: &str = "https://gw-fatoora.zatca.gov.sa/e-invoicing/core";

pub const COMPLIANCE_CSID_PATH: &str = "/compliance";
pub const COMPLIANCE_INVOICES_PATH: &str = "/compliance/invoices";
pub const PRODUCTION_CSID_PATH: &str = "/production/csids";
pub const CLEARANCE_PATH: &str = "/invoices/clearance/single";
pub const REPORTING_PATH: &str = "/invoices/reporting/single";

/// Which authority gateway a credential was issued by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthorityEnvironment {
    Sandbox,
    Simulation,
    Production,
}

impl AuthorityEnvironment {
    pub fn as_str(self) -> &'static str {
        match self {
            AuthorityEnvironment::Sandbox => "sandbox",
            AuthorityEnvironment::Simulation => "simulation",
            AuthorityEnvironment::Production => "production",
        }
    }

    pub fn base_url(self) -> &'static str {
        match self {
            AuthorityEnvironment::Sandbox | AuthorityEnvironment::Simulation => SIMULATION_GATEWAY,
            AuthorityEnvironment::Production => CORE_GATEWAY,
        }
    }

    /// Certificate template name carried in the CSR.
    pub fn template_name(self) -> &'static str {
        match self {
            AuthorityEnvironment::Sandbox | AuthorityEnvironment::Simulation => {
                "TSTZATCA-Code-Signing"
            }
            AuthorityEnvironment::Production => "ZATCA-Code-Signing",
        }
    }
}

impl FromStr for AuthorityEnvironment {
    type Err = ComplianceError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sandbox" => Ok(AuthorityEnvironment::Sandbox),
            "simulation" => Ok(AuthorityEnvironment::Simulation),
            "production" => Ok(AuthorityEnvironment::Production),
            other => Err(ComplianceError::format(
                "environment",
                format!("unknown authority environment `{other}`"),
            )),
        }
    }
}
