//! Gateway-wide configuration: pool sizes and the gateway's own advertised
//! name. Everything else (which transports exist, which access control
//! policy to install) is wired by the embedding application through the
//! trait seams in `access` and `transport`.

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub name: String,
    pub num_workers: usize,
    pub num_writers: usize,
    pub default_mtu: u16,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        GatewayConfig {
            name: "beetle".to_string(),
            num_workers: crate::registry::DEFAULT_NUM_WORKERS,
            num_writers: crate::registry::DEFAULT_NUM_WRITERS,
            default_mtu: crate::att::pdus::DEFAULT_LE_MTU,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_pool_sizes() {
        let cfg = GatewayConfig::default();
        assert_eq!(cfg.num_workers, 8);
        assert_eq!(cfg.num_writers, 4);
    }
}
