//! SCHC command-line tool
//!
//! Compresses IPv6/UDP packets given as hex or read from a pcapng capture,
//! decompresses SCHC frames, and prints the rule context.

use std::fs::File;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use pcap_file::DataLink;
use pcap_file::pcapng::{Block, PcapNgReader};
use serde_json::json;
use tracing::Level;

use schc_lora::interface::DEFAULT_MTU;
use schc_lora::{
    CompressedPacket, DeviceIdentity, InterfaceConfig, RuleSet, compress_packet,
    compress_packet_strict, decompress_packet,
};

/// Device EUI used when neither `--device-eui` nor a config file gives one.
const DEFAULT_DEVICE_EUI: &str = "00AF008589A1001F";

const ETHERNET_HEADER_LEN: usize = 14;
const ETHERTYPE_IPV6: u16 = 0x86DD;

#[derive(Parser, Debug)]
#[command(name = "schc")]
#[command(about = "SCHC header compression for IPv6/UDP over LoRaWAN", long_about = None)]
struct Cli {
    /// Interface configuration file (JSON)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Rules JSON file (overrides the config file and the built-in context)
    #[arg(short, long, global = true)]
    rules: Option<PathBuf>,

    /// Device EUI as 16 hex digits (overrides the config file)
    #[arg(short, long, global = true)]
    device_eui: Option<String>,

    /// Print results as JSON
    #[arg(short, long, global = true, default_value_t = false)]
    json: bool,

    /// Enable debug logging
    #[arg(short, long, global = true, default_value_t = false)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Compress an IPv6/UDP packet
    Compress {
        /// Packet bytes in hex
        #[arg(required_unless_present = "pcap")]
        packet: Option<String>,

        /// Read packets from a pcapng file instead
        #[arg(short, long, conflicts_with = "packet")]
        pcap: Option<PathBuf>,

        /// Maximum number of packets to process (0 = all)
        #[arg(short, long, default_value_t = 0)]
        max_packets: usize,

        /// Fail when no rule matches instead of sending the header uncompressed
        #[arg(long, default_value_t = false)]
        strict: bool,
    },

    /// Decompress a SCHC frame
    Decompress {
        /// Frame bytes in hex
        frame: String,
    },

    /// Print the rule context
    Rules,
}

/// Rule set, device identity and link MTU resolved from the command line.
struct Session {
    rules: RuleSet,
    device: DeviceIdentity,
    mtu: usize,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { Level::DEBUG } else { Level::WARN };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let ctx = load_context(&cli)?;

    match &cli.command {
        Command::Compress {
            packet,
            pcap,
            max_packets,
            strict,
        } => {
            if let Some(path) = pcap {
                compress_pcap(&ctx, path, *max_packets, *strict, cli.json)
            } else {
                let hex_packet = packet.as_deref().unwrap_or_default();
                let bytes = decode_hex(hex_packet).context("Invalid packet hex")?;
                let compressed = compress(&ctx, &bytes, *strict)?;
                report_compressed(1, &compressed, ctx.mtu, cli.json);
                Ok(())
            }
        }
        Command::Decompress { frame } => {
            let bytes = decode_hex(frame).context("Invalid frame hex")?;
            let out = decompress_packet(&bytes, &ctx.rules, &ctx.device)
                .context("Failed to decompress frame")?;
            if cli.json {
                let value = json!({
                    "rule_id": out.rule_id,
                    "bytes_consumed": out.bytes_consumed,
                    "packet": hex::encode(&out.data),
                    "source": out.header.map(|h| h.source().to_string()),
                    "destination": out.header.map(|h| h.destination().to_string()),
                });
                println!("{}", serde_json::to_string_pretty(&value)?);
            } else {
                match out.rule_id {
                    Some(id) => println!("Rule {} ({} bytes consumed)", id, out.bytes_consumed),
                    None => println!("Uncompressed"),
                }
                if let Some(header) = out.header {
                    println!("  {} -> {}", header.source(), header.destination());
                }
                println!("  {}", hex::encode(&out.data));
            }
            Ok(())
        }
        Command::Rules => {
            if cli.json {
                println!("{}", ctx.rules.to_json()?);
            } else {
                println!("Device EUI: {}", ctx.device);
                println!("{} rules\n", ctx.rules.len());
                for rule in ctx.rules.rules() {
                    println!("{}", rule);
                }
            }
            Ok(())
        }
    }
}

fn load_context(cli: &Cli) -> Result<Session> {
    let config = match &cli.config {
        Some(path) => Some(
            InterfaceConfig::from_file(path)
                .with_context(|| format!("Failed to load config {}", path.display()))?,
        ),
        None => None,
    };

    let rules = match (&cli.rules, &config) {
        (Some(path), _) => RuleSet::from_file(path)
            .with_context(|| format!("Failed to load rules {}", path.display()))?,
        (None, Some(config)) => config.load_rules().context("Failed to load rules")?,
        (None, None) => RuleSet::builtin().context("Built-in rules are invalid")?,
    };

    let device = match (&cli.device_eui, &config) {
        (Some(eui), _) => DeviceIdentity::from_hex(eui).context("Invalid device EUI")?,
        (None, Some(config)) => config.device().context("Invalid device EUI in config")?,
        (None, None) => DeviceIdentity::from_hex(DEFAULT_DEVICE_EUI)?,
    };

    let mtu = config.as_ref().map_or(DEFAULT_MTU, |config| config.mtu);

    tracing::debug!(rules = rules.len(), device = %device, mtu, "context loaded");
    Ok(Session { rules, device, mtu })
}

fn decode_hex(s: &str) -> Result<Vec<u8>> {
    let cleaned: String = s.chars().filter(|c| !c.is_whitespace() && *c != ':').collect();
    Ok(hex::decode(cleaned)?)
}

fn compress(ctx: &Session, packet: &[u8], strict: bool) -> Result<CompressedPacket> {
    let compressed = if strict {
        compress_packet_strict(packet, &ctx.rules, &ctx.device)?
    } else {
        compress_packet(packet, &ctx.rules, &ctx.device)?
    };
    Ok(compressed)
}

fn compress_pcap(
    ctx: &Session,
    path: &Path,
    max_packets: usize,
    strict: bool,
    json_output: bool,
) -> Result<()> {
    let file = File::open(path).context("Failed to open pcap file")?;
    let mut reader = PcapNgReader::new(file).context("Failed to create pcapng reader")?;

    let mut packet_count = 0usize;
    let mut compressed_count = 0usize;
    let mut skipped_count = 0usize;
    let mut total_saved = 0i64;
    // Link type of each interface, indexed by interface id
    let mut link_types: Vec<DataLink> = Vec::new();

    while let Some(block) = reader.next_block() {
        if max_packets > 0 && packet_count >= max_packets {
            break;
        }
        let block = block.context("Failed to read pcapng block")?;
        let epb = match block {
            Block::InterfaceDescription(idb) => {
                link_types.push(idb.linktype);
                continue;
            }
            Block::EnhancedPacket(epb) => epb,
            _ => continue,
        };
        packet_count += 1;

        let Some(&link_type) = link_types.get(epb.interface_id as usize) else {
            bail!(
                "Packet {} refers to undeclared interface {}",
                packet_count,
                epb.interface_id
            );
        };

        let Some(ip_packet) = ipv6_payload(&epb.data, link_type) else {
            tracing::debug!(packet = packet_count, "not an IPv6 packet, skipping");
            skipped_count += 1;
            continue;
        };

        match compress(ctx, ip_packet, strict) {
            Ok(compressed) => {
                if compressed.is_compressed() {
                    compressed_count += 1;
                }
                total_saved += compressed.savings_bytes();
                report_compressed(packet_count, &compressed, ctx.mtu, json_output);
            }
            Err(e) => {
                if strict {
                    bail!("Packet {}: {}", packet_count, e);
                }
                tracing::warn!(packet = packet_count, error = %e, "skipping packet");
                skipped_count += 1;
            }
        }
    }

    if json_output {
        let summary = json!({
            "packets": packet_count,
            "compressed": compressed_count,
            "skipped": skipped_count,
            "bytes_saved": total_saved,
        });
        println!("{}", serde_json::to_string(&summary)?);
    } else {
        println!("\n{}", "=".repeat(60));
        println!("Packets:     {}", packet_count);
        println!("Compressed:  {}", compressed_count);
        println!("Skipped:     {}", skipped_count);
        println!("Bytes saved: {}", total_saved);
    }
    Ok(())
}

/// IPv6 packet carried by a captured frame, going by the interface's link
/// type. Ethernet frames must carry the IPv6 ethertype.
fn ipv6_payload(frame: &[u8], link_type: DataLink) -> Option<&[u8]> {
    match link_type {
        DataLink::IPV6 => Some(frame),
        DataLink::RAW => (frame.first()? >> 4 == 6).then_some(frame),
        DataLink::ETHERNET => {
            let ethertype = frame.get(12..ETHERNET_HEADER_LEN)?;
            (u16::from_be_bytes([ethertype[0], ethertype[1]]) == ETHERTYPE_IPV6)
                .then(|| &frame[ETHERNET_HEADER_LEN..])
        }
        _ => None,
    }
}

fn report_compressed(index: usize, compressed: &CompressedPacket, mtu: usize, json_output: bool) {
    let fits_mtu = compressed.data.len() <= mtu;
    if !fits_mtu {
        tracing::warn!(
            packet = index,
            len = compressed.data.len(),
            mtu,
            "frame exceeds link MTU"
        );
    }

    if json_output {
        let value = json!({
            "packet": index,
            "rule_id": compressed.rule_id,
            "header_len": compressed.header_len,
            "savings_bytes": compressed.savings_bytes(),
            "fits_mtu": fits_mtu,
            "data": hex::encode(&compressed.data),
        });
        println!("{}", value);
        return;
    }

    let rule = compressed
        .rule_id
        .map_or_else(|| "none".to_string(), |id| id.to_string());
    println!(
        "Packet {}: {} header bytes -> {} (Rule: {} - Saved: {} bytes){}",
        index,
        compressed.original_header_len,
        compressed.header_len,
        rule,
        compressed.savings_bytes(),
        if fits_mtu { "" } else { " [exceeds MTU]" }
    );
    println!("  {}", hex::encode(&compressed.data));
}
