/// Connection settings.
struct Config {
    host: String,
    port: u16,
}

impl Config {
    /// True when a host is set.
    fn validate(&self) -> bool {
        !self.host.is_empty()
    }

    fn default_host() -> String {
        "localhost".to_string()
    }
}

enum Message {
    Quit,
    Send { payload: Vec<u8> },
    Echo(String),
}

// Receives messages from the bus.
trait Handler {
    fn handle(&self, msg: &Message);
    fn name(&self) -> &str { "default" }
}

const RETRIES: u8 = 3;
