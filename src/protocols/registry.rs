//! Deposit routing table.
//!
//! One `ProtocolEntry` per `Protocol`, looked up with an exhaustive match so
//! adding a protocol without a routing entry fails to compile.

use crate::types::{is_evm_address, Allocation, AllocatorError, Protocol, RoutingParams};

/// Builds the routing parameters for an allocation.
pub type RouteFn = fn(&Allocation, &str) -> Result<RoutingParams, AllocatorError>;

/// Static per-protocol deposit configuration.
#[derive(Debug)]
pub struct ProtocolEntry {
    pub protocol: Protocol,
    /// Action name the signing relay exposes for this protocol's deposit.
    pub deposit_action: &'static str,
    pub route: RouteFn,
}

static MOONWELL: ProtocolEntry = ProtocolEntry {
    protocol: Protocol::Moonwell,
    deposit_action: "moonwell.mint",
    route: route_moonwell,
};

static MORPHO: ProtocolEntry = ProtocolEntry {
    protocol: Protocol::Morpho,
    deposit_action: "morpho.deposit",
    route: route_morpho,
};

impl Protocol {
    /// The routing entry for this protocol.
    pub fn entry(self) -> &'static ProtocolEntry {
        match self {
            Protocol::Moonwell => &MOONWELL,
            Protocol::Morpho => &MORPHO,
        }
    }
}

/// Resolve routing for `allocation`, depositing on behalf of `wallet`.
pub fn route(allocation: &Allocation, wallet: &str) -> Result<RoutingParams, AllocatorError> {
    (allocation.protocol.entry().route)(allocation, wallet)
}

fn contract_address(allocation: &Allocation) -> Result<String, AllocatorError> {
    if is_evm_address(&allocation.address) {
        Ok(allocation.address.clone())
    } else {
        Err(AllocatorError::MarketUnavailable {
            protocol: allocation.protocol,
            reason: format!(
                "invalid contract address '{}' for {}",
                allocation.address, allocation.vault_id
            ),
        })
    }
}

fn route_moonwell(allocation: &Allocation, _wallet: &str) -> Result<RoutingParams, AllocatorError> {
    Ok(RoutingParams::Moonwell {
        destination: contract_address(allocation)?,
    })
}

fn route_morpho(allocation: &Allocation, wallet: &str) -> Result<RoutingParams, AllocatorError> {
    if !is_evm_address(wallet) {
        return Err(AllocatorError::InvalidInput(format!(
            "receiver address '{wallet}' is not a valid address"
        )));
    }
    Ok(RoutingParams::Morpho {
        vault: contract_address(allocation)?,
        receiver: wallet.to_string(),
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
