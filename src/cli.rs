use clap::Parser;
use dns_traffic_analyzer::pcap::DNS_FILTER;

#[derive(Parser, Debug)]
#[command(name = "dns-traffic-analyzer")]
#[command(about = "Live DNS traffic analytics with TUI", long_about = None)]
pub struct Args {
    #[arg(short, long)]
    pub interface: Option<String>,

    /// BPF expression applied to the capture
    #[arg(short, long, default_value = DNS_FILTER)]
    pub filter: String,

    #[arg(short, long, default_value = "info")]
    pub log_level: String,

    #[arg(long)]
    pub list_interfaces: bool,

    /// Print statistics as JSON instead of drawing the dashboard
    #[arg(long)]
    pub json: bool,

    /// Seconds between JSON reports
    #[arg(long, default_value_t = 5, value_parser = clap::value_parser!(u64).range(1..))]
    pub interval: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let args = Args::parse_from(["dns-traffic-analyzer"]);
        assert_eq!(args.filter, DNS_FILTER);
        assert_eq!(args.log_level, "info");
        assert_eq!(args.interval, 5);
        assert!(args.interface.is_none());
        assert!(!args.json);
    }

    #[test]
    fn zero_interval_is_rejected() {
        assert!(Args::try_parse_from(["dns-traffic-analyzer", "--json", "--interval", "0"]).is_err());
    }
}
