//! Torrent metadata extraction.
//!
//! Reads the file listing and info-hash out of raw `.torrent` bytes without
//! involving a daemon. Decoding is best effort: anything malformed yields
//! `None` and callers proceed without file-list knowledge.

use std::time::Duration;

use librqbit_core::torrent_metainfo::{torrent_from_bytes, TorrentMetaV1Owned};
use reqwest::Client;
use tracing::debug;

/// What we could learn from a torrent descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TorrentMetadata {
    /// SHA-1 over the encoded `info` dictionary (lowercase hex).
    pub info_hash: String,
    /// `info.name`.
    pub name: String,
    /// File paths in descriptor order. A single-file torrent lists its name.
    pub files: Vec<String>,
}

/// Parse raw torrent bytes. Pure; never panics on hostile input.
pub fn parse_metadata(bytes: &[u8]) -> Option<TorrentMetadata> {
    let torrent: TorrentMetaV1Owned = match torrent_from_bytes(bytes) {
        Ok(t) => t,
        Err(e) => {
            debug!(error = %e, "Torrent descriptor rejected");
            return None;
        }
    };

    let info = &torrent.info;
    let name = bytes_to_string(info.name.as_ref()?.as_ref());

    let files = if let Some(ref files) = info.files {
        let mut paths = Vec::with_capacity(files.len());
        for file in files {
            if file.path.is_empty() {
                return None;
            }
            let segments: Vec<String> = file
                .path
                .iter()
                .map(|part| bytes_to_string(part.as_ref()))
                .collect();
            paths.push(segments.join("/"));
        }
        if paths.is_empty() {
            return None;
        }
        paths
    } else if info.length.is_some() {
        vec![name.clone()]
    } else {
        return None;
    };

    Some(TorrentMetadata {
        info_hash: torrent.info_hash.as_string(),
        name,
        files,
    })
}

/// Download a descriptor and parse it.
///
/// Magnet links carry no file list and are skipped. Network failures, non-2xx
/// responses and undecodable bodies all come back as `None`.
pub async fn fetch_metadata(client: &Client, url: &str, timeout: Duration) -> Option<TorrentMetadata> {
    if is_magnet(url) {
        debug!("Skipping metadata pre-fetch for magnet link");
        return None;
    }

    let response = match client.get(url).timeout(timeout).send().await {
        Ok(r) => r,
        Err(e) => {
            debug!(error = %e, "Metadata pre-fetch failed");
            return None;
        }
    };

    if !response.status().is_success() {
        debug!(status = %response.status(), "Metadata pre-fetch returned non-success");
        return None;
    }

    let bytes = response.bytes().await.ok()?;
    let parsed = parse_metadata(&bytes);
    if parsed.is_none() {
        debug!(len = bytes.len(), "Fetched descriptor could not be decoded");
    }
    parsed
}

pub fn is_magnet(url: &str) -> bool {
    url.trim_start().to_ascii_lowercase().starts_with("magnet:")
}

/// Hex info-hash from a magnet's `xt=urn:btih:` parameter.
///
/// Accepts the 40-character hex form and the 32-character base32 form.
pub fn magnet_info_hash(magnet: &str) -> Option<String> {
    if !is_magnet(magnet) {
        return None;
    }
    let (_, query) = magnet.split_once('?')?;
    query
        .split('&')
        .filter_map(|param| param.strip_prefix("xt=urn:btih:"))
        .find_map(|hash| match hash.len() {
            40 if hash.chars().all(|c| c.is_ascii_hexdigit()) => Some(hash.to_lowercase()),
            32 => base32_decode(hash).filter(|b| b.len() == 20).map(|b| hex(&b)),
            _ => None,
        })
}

/// RFC 4648 base32, case-insensitive, padding ignored.
fn base32_decode(input: &str) -> Option<Vec<u8>> {
    const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ234567";

    let input = input.to_ascii_uppercase();
    let input = input.trim_end_matches('=');

    let mut output = Vec::with_capacity(input.len() * 5 / 8);
    let mut buffer: u64 = 0;
    let mut bits = 0;

    for c in input.bytes() {
        let value = ALPHABET.iter().position(|&x| x == c)? as u64;
        buffer = (buffer << 5) | value;
        bits += 5;
        if bits >= 8 {
            bits -= 8;
            output.push((buffer >> bits) as u8);
            buffer &= (1 << bits) - 1;
        }
    }

    Some(output)
}

fn bytes_to_string(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use sha1::{Digest, Sha1};

    /// Wrap bencoded `info` entries (without the surrounding `d..e`) into a
    /// complete descriptor with valid piece fields.
    fn descriptor(info_entries: &[u8]) -> Vec<u8> {
        let mut out = b"d8:announce9:http://tr4:infod".to_vec();
        out.extend_from_slice(info_entries);
        out.extend_from_slice(b"12:piece lengthi16384e6:pieces20:");
        out.extend_from_slice(&[0u8; 20]);
        out.extend_from_slice(b"ee");
        out
    }

    fn single_file_torrent() -> Vec<u8> {
        descriptor(b"6:lengthi1024e4:name17:Game [v65536].nsp")
    }

    #[test]
    fn test_parse_single_file() {
        let meta = parse_metadata(&single_file_torrent()).unwrap();
        assert_eq!(meta.name, "Game [v65536].nsp");
        assert_eq!(meta.files, vec!["Game [v65536].nsp".to_string()]);
        assert_eq!(meta.info_hash.len(), 40);
    }

    #[test]
    fn test_info_hash_covers_only_info_dict() {
        let data = single_file_torrent();
        let start = data.windows(5).position(|w| w == b"infod").unwrap() + 4;
        let info_bytes = &data[start..data.len() - 1];
        let expected = hex(&Sha1::digest(info_bytes));
        assert_eq!(parse_metadata(&data).unwrap().info_hash, expected);
    }

    #[test]
    fn test_parse_multi_file() {
        let data = descriptor(
            b"5:filesld6:lengthi10e4:pathl3:dir10:A [v0].nspeed6:lengthi20e4:pathl14:A [v65536].nspeee4:name4:Pack",
        );
        let meta = parse_metadata(&data).unwrap();
        assert_eq!(meta.name, "Pack");
        assert_eq!(
            meta.files,
            vec!["dir/A [v0].nsp".to_string(), "A [v65536].nsp".to_string()]
        );
    }

    #[test]
    fn test_parse_lenient_on_invalid_utf8() {
        let data = descriptor(b"6:lengthi1e4:name3:\xffab");
        let meta = parse_metadata(&data).unwrap();
        assert!(meta.name.ends_with("ab"));
    }

    #[test]
    fn test_parse_truncated_returns_none() {
        let data = single_file_torrent();
        for cut in [0, 1, 10, data.len() / 2, data.len() - 1] {
            assert!(parse_metadata(&data[..cut]).is_none(), "cut at {}", cut);
        }
    }

    #[test]
    fn test_parse_garbage_returns_none() {
        assert!(parse_metadata(b"<html>not a torrent</html>").is_none());
        assert!(parse_metadata(&[0xff; 64]).is_none());
    }

    #[test]
    fn test_parse_without_files_or_length_returns_none() {
        assert!(parse_metadata(&descriptor(b"4:name1:x")).is_none());
        // empty file list
        assert!(parse_metadata(&descriptor(b"5:filesle4:name1:x")).is_none());
    }

    #[test]
    fn test_is_magnet() {
        assert!(is_magnet("magnet:?xt=urn:btih:abc"));
        assert!(is_magnet("  MAGNET:?xt=urn:btih:abc"));
        assert!(!is_magnet("http://indexer/download/1"));
    }

    #[test]
    fn test_magnet_info_hash() {
        let hash = "0123456789ABCDEF0123456789ABCDEF01234567";
        assert_eq!(
            magnet_info_hash(&format!("magnet:?dn=Game&xt=urn:btih:{}", hash)),
            Some(hash.to_lowercase())
        );
        // base32 of "abcdefghijklmnopqrst"
        assert_eq!(
            magnet_info_hash("magnet:?xt=urn:btih:MFRGGZDFMZTWQ2LKNNWG23TPOBYXE43U").as_deref(),
            Some("6162636465666768696a6b6c6d6e6f7071727374")
        );
        assert_eq!(
            magnet_info_hash("magnet:?xt=urn:btih:mfrggzdfmztwq2lknnwg23tpobyxe43u"),
            magnet_info_hash("magnet:?xt=urn:btih:MFRGGZDFMZTWQ2LKNNWG23TPOBYXE43U")
        );
        assert_eq!(magnet_info_hash("magnet:?xt=urn:btih:MFRGGZDFMZTWQ2LKNNWG23TPOBYXE4!U"), None);
        assert_eq!(magnet_info_hash("http://indexer/dl?xt=urn:btih:abc"), None);
    }

    #[tokio::test]
    async fn test_fetch_metadata_skips_magnet() {
        let client = Client::new();
        let result = fetch_metadata(&client, "magnet:?xt=urn:btih:abc", Duration::from_secs(1)).await;
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_fetch_metadata_over_http() {
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/dl/1"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(single_file_torrent()))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/dl/missing"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = Client::new();
        let ok = fetch_metadata(&client, &format!("{}/dl/1", server.uri()), Duration::from_secs(5)).await;
        assert_eq!(ok.unwrap().files.len(), 1);

        let missing =
            fetch_metadata(&client, &format!("{}/dl/missing", server.uri()), Duration::from_secs(5)).await;
        assert!(missing.is_none());
    }
}
