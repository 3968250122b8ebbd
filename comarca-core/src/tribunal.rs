use std::{fmt, str::FromStr};

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Result, ScrapeError};

/// Identifier grammar: uppercase court code, e-filing system, judicial degree.
static TRIBUNAL_ID_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Z0-9]{3,6}-(PJE|EPROC|ESAJ|PROJUDI|THEMIS)-(1g|2g|unico)$")
        .expect("tribunal id grammar")
});

/// E-filing platform type. One scraper adapter exists per sistema.
#[derive(
    Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize,
)]
pub enum Sistema {
    Pje,
    Eproc,
    Esaj,
    Projudi,
    Themis,
}

impl Sistema {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sistema::Pje => "PJE",
            Sistema::Eproc => "EPROC",
            Sistema::Esaj => "ESAJ",
            Sistema::Projudi => "PROJUDI",
            Sistema::Themis => "THEMIS",
        }
    }

    pub fn all() -> &'static [Self] {
        &[
            Sistema::Pje,
            Sistema::Eproc,
            Sistema::Esaj,
            Sistema::Projudi,
            Sistema::Themis,
        ]
    }
}

impl fmt::Display for Sistema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Sistema {
    type Err = String;

    // Case-sensitive: lowercase sistema tokens are rejected by the grammar.
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "PJE" => Ok(Sistema::Pje),
            "EPROC" => Ok(Sistema::Eproc),
            "ESAJ" => Ok(Sistema::Esaj),
            "PROJUDI" => Ok(Sistema::Projudi),
            "THEMIS" => Ok(Sistema::Themis),
            other => Err(format!("unknown sistema: {other}")),
        }
    }
}

/// Judicial degree: first instance, second instance, or unified.
#[derive(
    Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize,
)]
pub enum Grau {
    Primeiro,
    Segundo,
    Unico,
}

impl Grau {
    pub fn as_str(&self) -> &'static str {
        match self {
            Grau::Primeiro => "1g",
            Grau::Segundo => "2g",
            Grau::Unico => "unico",
        }
    }
}

impl fmt::Display for Grau {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Grau {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "1g" => Ok(Grau::Primeiro),
            "2g" => Ok(Grau::Segundo),
            "unico" => Ok(Grau::Unico),
            other => Err(format!("unknown grau: {other}")),
        }
    }
}

/// Validated `CODE-SISTEMA-GRAU` tribunal target identifier.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct TribunalId {
    pub code: String,
    pub sistema: Sistema,
    pub grau: Grau,
}

impl TribunalId {
    /// Parses and validates against the identifier grammar. Lowercase codes
    /// and out-of-set sistema/grau tokens are rejected.
    pub fn parse(raw: &str) -> Result<Self> {
        if !TRIBUNAL_ID_RE.is_match(raw) {
            return Err(ScrapeError::validation(format!(
                "invalid tribunal identifier: {raw}"
            )));
        }
        let mut parts = raw.split('-');
        let code = parts.next().unwrap_or_default().to_string();
        let sistema = parts
            .next()
            .unwrap_or_default()
            .parse::<Sistema>()
            .map_err(ScrapeError::Validation)?;
        let grau = parts
            .next()
            .unwrap_or_default()
            .parse::<Grau>()
            .map_err(ScrapeError::Validation)?;
        Ok(Self {
            code,
            sistema,
            grau,
        })
    }
}

impl fmt::Display for TribunalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}-{}", self.code, self.sistema, self.grau)
    }
}

impl Serialize for TribunalId {
    fn serialize<S: serde::Serializer>(
        &self,
        serializer: S,
    ) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for TribunalId {
    fn deserialize<D: serde::Deserializer<'de>>(
        deserializer: D,
    ) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        TribunalId::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// Catalog entry for one reachable tribunal target.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TribunalConfig {
    pub id: TribunalId,
    /// Human-readable court name shown on operator surfaces.
    pub name: String,
    /// Two-letter state code, or "BR" for federal/national courts.
    pub uf: String,
    pub url: String,
}

/// Static catalog of valid tribunal targets.
#[derive(Debug)]
pub struct TribunalRegistry {
    configs: Vec<TribunalConfig>,
}

impl Default for TribunalRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl TribunalRegistry {
    /// Registry seeded with the built-in tribunal catalog.
    pub fn builtin() -> Self {
        let mut configs: Vec<TribunalConfig> = BUILTIN_CATALOG
            .iter()
            .map(|(raw, name, uf, url)| TribunalConfig {
                id: TribunalId::parse(raw).expect("builtin catalog identifier"),
                name: (*name).to_string(),
                uf: (*uf).to_string(),
                url: (*url).to_string(),
            })
            .collect();
        configs.sort_by(|a, b| a.id.to_string().cmp(&b.id.to_string()));
        Self { configs }
    }

    pub fn with_configs(mut configs: Vec<TribunalConfig>) -> Self {
        configs.sort_by(|a, b| a.id.to_string().cmp(&b.id.to_string()));
        Self { configs }
    }

    pub fn lookup(
        &self,
        code: &str,
        sistema: Sistema,
        grau: Grau,
    ) -> Option<&TribunalConfig> {
        self.configs.iter().find(|c| {
            c.id.code == code && c.id.sistema == sistema && c.id.grau == grau
        })
    }

    pub fn lookup_id(&self, id: &TribunalId) -> Option<&TribunalConfig> {
        self.lookup(&id.code, id.sistema, id.grau)
    }

    /// Resolves a raw `CODE-SISTEMA-GRAU` target string.
    pub fn resolve(&self, raw: &str) -> Result<TribunalConfig> {
        let id = TribunalId::parse(raw)?;
        self.lookup_id(&id)
            .cloned()
            .ok_or_else(|| {
                ScrapeError::validation(format!("unknown tribunal target: {raw}"))
            })
    }

    /// All configs, ordered by identifier, for target selection surfaces.
    pub fn list(&self) -> &[TribunalConfig] {
        &self.configs
    }
}

type CatalogRow = (&'static str, &'static str, &'static str, &'static str);

// Labor courts run PJe across both degrees; state courts split between
// ESAJ/PROJUDI/THEMIS; federal regional courts expose a unified eproc.
const BUILTIN_CATALOG: &[CatalogRow] = &[
    ("TRT1-PJE-1g", "TRT da 1ª Região", "RJ", "https://pje.trt1.jus.br"),
    ("TRT1-PJE-2g", "TRT da 1ª Região", "RJ", "https://pje.trt1.jus.br/segundograu"),
    ("TRT2-PJE-1g", "TRT da 2ª Região", "SP", "https://pje.trt2.jus.br"),
    ("TRT2-PJE-2g", "TRT da 2ª Região", "SP", "https://pje.trt2.jus.br/segundograu"),
    ("TRT3-PJE-1g", "TRT da 3ª Região", "MG", "https://pje.trt3.jus.br"),
    ("TRT3-PJE-2g", "TRT da 3ª Região", "MG", "https://pje.trt3.jus.br/segundograu"),
    ("TRT15-PJE-1g", "TRT da 15ª Região", "SP", "https://pje.trt15.jus.br"),
    ("TRT15-PJE-2g", "TRT da 15ª Região", "SP", "https://pje.trt15.jus.br/segundograu"),
    ("TJSP-ESAJ-unico", "Tribunal de Justiça de São Paulo", "SP", "https://esaj.tjsp.jus.br"),
    ("TJAL-ESAJ-unico", "Tribunal de Justiça de Alagoas", "AL", "https://www2.tjal.jus.br/esaj"),
    ("TJMS-ESAJ-unico", "Tribunal de Justiça de Mato Grosso do Sul", "MS", "https://esaj.tjms.jus.br"),
    ("TJMG-PJE-1g", "Tribunal de Justiça de Minas Gerais", "MG", "https://pje.tjmg.jus.br"),
    ("TJMG-PJE-2g", "Tribunal de Justiça de Minas Gerais", "MG", "https://pje.tjmg.jus.br/pje2g"),
    ("TJPR-PROJUDI-unico", "Tribunal de Justiça do Paraná", "PR", "https://projudi.tjpr.jus.br"),
    ("TJGO-PROJUDI-unico", "Tribunal de Justiça de Goiás", "GO", "https://projudi.tjgo.jus.br"),
    ("TJRS-EPROC-1g", "Tribunal de Justiça do Rio Grande do Sul", "RS", "https://eproc1g.tjrs.jus.br"),
    ("TJRS-EPROC-2g", "Tribunal de Justiça do Rio Grande do Sul", "RS", "https://eproc2g.tjrs.jus.br"),
    ("TJSC-EPROC-1g", "Tribunal de Justiça de Santa Catarina", "SC", "https://eproc1g.tjsc.jus.br"),
    ("TJSC-EPROC-2g", "Tribunal de Justiça de Santa Catarina", "SC", "https://eproc2g.tjsc.jus.br"),
    ("TJCE-THEMIS-unico", "Tribunal de Justiça do Ceará", "CE", "https://themis.tjce.jus.br"),
    ("TRF4-EPROC-unico", "Tribunal Regional Federal da 4ª Região", "BR", "https://eproc.trf4.jus.br"),
    ("TRF6-PJE-unico", "Tribunal Regional Federal da 6ª Região", "BR", "https://pje.trf6.jus.br"),
];
