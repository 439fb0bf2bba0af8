//! Solidity interface definitions of the deployed contracts.
//!
//! Only the functions used by the action hooks are declared:
//! - [`IAiTextNft`] - Text NFT collection minted for a dynamic fee
//! - [`IAiLaunchpad`] - Marketplace where minted tokens are listed and bought

use alloy_sol_types::sol;

sol! {
    /// Text NFT collection. `mint` must be paid with at least `mintFee()`.
    #[allow(missing_docs)]
    #[sol(extra_methods)]
    #[derive(Debug, PartialEq, Eq)]
    interface IAiTextNft {
        function mintFee() external view returns (uint256);
        function mint(string content) external payable returns (uint256);
    }
}

sol! {
    /// Launchpad marketplace. `buy` must be paid with the listing price.
    #[allow(missing_docs)]
    #[sol(extra_methods)]
    #[derive(Debug, PartialEq, Eq)]
    interface IAiLaunchpad {
        function buy(uint256 listingId) external payable;
    }
}
