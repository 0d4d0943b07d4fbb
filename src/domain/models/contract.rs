//! Contract and dispensa records from external transparency sources.
//!
//! Contract payloads are opaque JSON; the engine only reads the handful of
//! fields the pre-screen needs. Dispensas (waivers of bidding) are
//! normalised into a fixed shape before analysis.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An opaque contract record from the transparency data provider.
///
/// Wraps the raw JSON and exposes typed accessors for the fields the
/// pre-screen reads: `valor|valorInicial|valorGlobal`,
/// `modalidadeLicitacao`, `numeroProponentes`, `id`, `objeto`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContractRecord(pub serde_json::Value);

impl ContractRecord {
    pub fn new(raw: serde_json::Value) -> Self {
        Self(raw)
    }

    /// Contract value, trying `valor`, then `valorInicial`, then
    /// `valorGlobal`. Zero when absent or non-numeric.
    pub fn value(&self) -> f64 {
        for key in ["valor", "valorInicial", "valorGlobal"] {
            if let Some(v) = self.0.get(key).and_then(serde_json::Value::as_f64) {
                return v;
            }
        }
        0.0
    }

    /// Bidding modality, lowercased. Empty when absent.
    pub fn modality(&self) -> String {
        self.0
            .get("modalidadeLicitacao")
            .and_then(serde_json::Value::as_str)
            .unwrap_or_default()
            .to_lowercase()
    }

    /// Number of bidders. Zero when absent.
    pub fn bidder_count(&self) -> u64 {
        self.0
            .get("numeroProponentes")
            .and_then(serde_json::Value::as_u64)
            .unwrap_or(0)
    }

    /// Source identifier of the contract.
    pub fn id(&self) -> Option<String> {
        match self.0.get("id") {
            Some(serde_json::Value::String(s)) => Some(s.clone()),
            Some(serde_json::Value::Number(n)) => Some(n.to_string()),
            _ => None,
        }
    }

    /// Contract object/subject description.
    pub fn subject(&self) -> String {
        self.0
            .get("objeto")
            .and_then(serde_json::Value::as_str)
            .unwrap_or_default()
            .to_string()
    }

    /// Raw JSON payload.
    pub fn raw(&self) -> &serde_json::Value {
        &self.0
    }
}

/// Filter for transparency data queries.
///
/// Dates use the provider's DD/MM/YYYY format.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContractFilter {
    /// Start date, DD/MM/YYYY.
    pub data_inicial: Option<String>,
    /// End date, DD/MM/YYYY.
    pub data_final: Option<String>,
    /// Organisation (orgao) code.
    pub codigo_orgao: Option<String>,
    /// Minimum contract value.
    pub valor_minimo: Option<f64>,
    /// Maximum contract value.
    pub valor_maximo: Option<f64>,
    /// Bidding modality.
    pub modalidade: Option<String>,
    /// Page number (provider pagination starts at 1).
    pub pagina: Option<u32>,
}

impl ContractFilter {
    /// Build a filter for a date window.
    pub fn for_window(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            data_inicial: Some(start.format("%d/%m/%Y").to_string()),
            data_final: Some(end.format("%d/%m/%Y").to_string()),
            ..Self::default()
        }
    }

    pub fn with_organisation(mut self, code: impl Into<String>) -> Self {
        self.codigo_orgao = Some(code.into());
        self
    }

    /// Render as provider query parameters.
    pub fn to_params(&self) -> Vec<(&'static str, String)> {
        let mut params = Vec::new();
        if let Some(ref v) = self.data_inicial {
            params.push(("dataInicial", v.clone()));
        }
        if let Some(ref v) = self.data_final {
            params.push(("dataFinal", v.clone()));
        }
        if let Some(ref v) = self.codigo_orgao {
            params.push(("codigoOrgao", v.clone()));
        }
        if let Some(v) = self.valor_minimo {
            params.push(("valorInicial", v.to_string()));
        }
        if let Some(v) = self.valor_maximo {
            params.push(("valorFinal", v.to_string()));
        }
        if let Some(ref v) = self.modalidade {
            params.push(("modalidadeLicitacao", v.clone()));
        }
        params.push(("pagina", self.pagina.unwrap_or(1).to_string()));
        params
    }
}

/// A supplier in a normalised dispensa.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Supplier {
    pub nome: String,
    pub cnpj: String,
}

/// An organisation in a normalised dispensa.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Organisation {
    pub nome: String,
    pub codigo: String,
}

/// Provenance metadata attached to a normalised dispensa.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispensaMetadata {
    pub source: String,
    pub fetched_at: DateTime<Utc>,
    pub original_data: serde_json::Value,
}

/// A waiver of bidding pulled from the external dispensa source,
/// normalised for pre-screening and agent input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dispensa {
    pub id: Option<String>,
    pub numero: Option<String>,
    pub objeto: String,
    pub valor: f64,
    pub fornecedor: Supplier,
    pub orgao: Organisation,
    pub data: Option<String>,
    pub justificativa: String,
    pub metadata: DispensaMetadata,
}

impl Dispensa {
    /// Normalise a raw source payload.
    pub fn from_raw(raw: serde_json::Value) -> Self {
        let str_at = |v: &serde_json::Value, key: &str| {
            v.get(key)
                .and_then(serde_json::Value::as_str)
                .unwrap_or_default()
                .to_string()
        };
        let fornecedor = raw.get("fornecedor").cloned().unwrap_or_default();
        let orgao = raw.get("orgao").cloned().unwrap_or_default();

        Self {
            id: raw
                .get("id")
                .map(|v| v.as_str().map_or_else(|| v.to_string(), String::from)),
            numero: raw
                .get("numero")
                .and_then(serde_json::Value::as_str)
                .map(String::from),
            objeto: str_at(&raw, "objeto"),
            valor: raw
                .get("valor")
                .and_then(serde_json::Value::as_f64)
                .unwrap_or(0.0),
            fornecedor: Supplier {
                nome: str_at(&fornecedor, "nome"),
                cnpj: str_at(&fornecedor, "cnpj"),
            },
            orgao: Organisation {
                nome: str_at(&orgao, "nome"),
                codigo: str_at(&orgao, "codigo"),
            },
            data: raw
                .get("data")
                .and_then(serde_json::Value::as_str)
                .map(String::from),
            justificativa: str_at(&raw, "justificativa"),
            metadata: DispensaMetadata {
                source: "dispensa_scan".to_string(),
                fetched_at: Utc::now(),
                original_data: raw,
            },
        }
    }

    /// View this dispensa as a contract record for the shared pre-screen.
    ///
    /// Dispensas are waivers of bidding by definition, so the record
    /// carries the waiver modality and a single bidder alongside the full
    /// normalised snapshot.
    pub fn as_contract_record(&self) -> ContractRecord {
        let mut value = serde_json::to_value(self).unwrap_or(serde_json::Value::Null);
        if let Some(obj) = value.as_object_mut() {
            obj.insert(
                "modalidadeLicitacao".to_string(),
                serde_json::Value::String("dispensa".to_string()),
            );
            obj.insert("numeroProponentes".to_string(), serde_json::json!(1));
        }
        ContractRecord::new(value)
    }
}
