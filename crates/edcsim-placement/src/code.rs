use edcsim_common::config::{CodeConfig, CodeType};
use edcsim_common::{Error, Result};

/// Validated view over a `CodeConfig`: stripe width `n`, data chunks `k`,
/// local parity group count `l` (zero outside LRC).
#[derive(Clone, Debug)]
pub struct Code {
    pub kind: CodeType,
    pub n: usize,
    pub k: usize,
    pub l: usize,
}

impl Code {
    pub fn from_config(cfg: &CodeConfig) -> Result<Self> {
        if cfg.k >= cfg.n {
            return Err(Error::configuration(format!(
                "code_k ({}) must be less than code_n ({})",
                cfg.k, cfg.n
            )));
        }
        if matches!(cfg.code_type, CodeType::Drc) && !matches!((cfg.n, cfg.k), (9, 6) | (9, 5)) {
            return Err(Error::configuration(
                "DRC only supports (n=9,k=6) or (n=9,k=5)".to_string(),
            ));
        }
        if matches!(cfg.code_type, CodeType::Lrc) && cfg.l == 0 {
            return Err(Error::configuration(
                "LRC requires at least one local parity group".to_string(),
            ));
        }
        Ok(Self {
            kind: cfg.code_type,
            n: cfg.n,
            k: cfg.k,
            l: cfg.l,
        })
    }

    /// Single-chunk repair cost for DRC, per the source's fixed table:
    /// `(9,5)` costs 1 chunk-equivalent, `(9,6)` costs 2.
    pub fn drc_single_chunk_cost(&self) -> Result<f64> {
        match (self.n, self.k) {
            (9, 5) => Ok(1.0),
            (9, 6) => Ok(2.0),
            _ => Err(Error::internal(format!(
                "unsupported DRC configuration (n={}, k={})",
                self.n, self.k
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drc_rejects_unsupported_n_k() {
        let cfg = CodeConfig {
            code_type: CodeType::Drc,
            n: 9,
            k: 7,
            l: 0,
        };
        assert!(Code::from_config(&cfg).is_err());
    }

    #[test]
    fn drc_single_chunk_costs_match_the_documented_table() {
        let rs6 = Code {
            kind: CodeType::Drc,
            n: 9,
            k: 6,
            l: 0,
        };
        let rs5 = Code {
            kind: CodeType::Drc,
            n: 9,
            k: 5,
            l: 0,
        };
        assert_eq!(rs6.drc_single_chunk_cost().unwrap(), 2.0);
        assert_eq!(rs5.drc_single_chunk_cost().unwrap(), 1.0);
    }
}
