//! Chain-explorer lookup table.
//!
//! Configuration data, not logic: chain id → block-explorer base URL, used
//! to render transaction links for processed actions.

/// Known chain id → explorer base URL (no trailing slash).
const CHAIN_EXPLORERS: &[(u64, &str)] = &[
    (1, "https://etherscan.io"),
    (10, "https://optimistic.etherscan.io"),
    (56, "https://bscscan.com"),
    (137, "https://polygonscan.com"),
    (8453, "https://basescan.org"),
    (42161, "https://arbiscan.io"),
    (43114, "https://snowtrace.io"),
    (59144, "https://lineascan.build"),
    (81457, "https://blastscan.io"),
    (534352, "https://scrollscan.com"),
    (11155111, "https://sepolia.etherscan.io"),
    (84532, "https://sepolia.basescan.org"),
];

pub fn explorer_base_url(chain_id: u64) -> Option<&'static str> {
    CHAIN_EXPLORERS
        .iter()
        .find(|(id, _)| *id == chain_id)
        .map(|(_, url)| *url)
}

/// Explorer link for a transaction hash, when the chain is known.
pub fn explorer_tx_url(chain_id: u64, tx_hash: &str) -> Option<String> {
    explorer_base_url(chain_id).map(|base| format!("{base}/tx/{tx_hash}"))
}

/// Explorer link for an address, when the chain is known.
pub fn explorer_address_url(chain_id: u64, address: &str) -> Option<String> {
    explorer_base_url(chain_id).map(|base| format!("{base}/address/{address}"))
}
