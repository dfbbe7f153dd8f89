use std::net::{IpAddr, Ipv4Addr};

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind the server to
    pub bind_address: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Number of horses in the opening roster
    pub horse_count: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)),
            port: 4000,
            horse_count: 10,
        }
    }
}

impl ServerConfig {
    /// Load config from environment or use defaults
    pub fn load_or_default() -> Self {
        let mut config = Self::default();

        if let Ok(addr) = std::env::var("BIND_ADDRESS") {
            if let Ok(parsed) = addr.parse() {
                config.bind_address = parsed;
            } else {
                tracing::warn!("Invalid BIND_ADDRESS '{}', using default", addr);
            }
        }

        if let Ok(port) = std::env::var("PORT") {
            if let Ok(parsed) = port.parse::<u16>() {
                if parsed > 0 {
                    config.port = parsed;
                } else {
                    tracing::warn!("PORT must be > 0, using default");
                }
            } else {
                tracing::warn!("Invalid PORT '{}', using default", port);
            }
        }

        if let Ok(count) = std::env::var("HORSE_COUNT") {
            if let Ok(parsed) = count.parse::<usize>() {
                if parsed >= 1 && parsed <= 100 {
                    config.horse_count = parsed;
                } else {
                    tracing::warn!("HORSE_COUNT must be 1-100, using default");
                }
            } else {
                tracing::warn!("Invalid HORSE_COUNT '{}', using default", count);
            }
        }

        config
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<(), String> {
        if self.port == 0 {
            return Err("Port cannot be 0".to_string());
        }
        if self.horse_count == 0 {
            return Err("horse_count must be at least 1".to_string());
        }
        Ok(())
    }
}
