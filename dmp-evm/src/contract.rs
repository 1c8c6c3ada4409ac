//! Solidity interface of the marketplace payment router.

use alloy_sol_types::sol;

sol! {
    /// Payment router receiving marketplace payments.
    ///
    /// The router records the backend order and forwards `msg.value` to the
    /// seller.
    #[allow(missing_docs)]
    #[derive(Debug)]
    #[sol(rpc)]
    interface PayRouter {
        function payForProduct(uint256 orderId, address seller) external payable;
    }
}

#[cfg(test)]
mod tests {
    use super::PayRouter::payForProductCall;
    use alloy_primitives::{Address, U256};
    use alloy_sol_types::SolCall;

    #[test]
    fn test_pay_for_product_abi() {
        assert_eq!(payForProductCall::SIGNATURE, "payForProduct(uint256,address)");

        let call = payForProductCall {
            orderId: U256::from(7u64),
            seller: Address::with_last_byte(0xbb),
        };
        let encoded = call.abi_encode();
        assert_eq!(encoded.len(), 4 + 32 + 32);
        assert_eq!(&encoded[..4], payForProductCall::SELECTOR.as_slice());
        assert_eq!(encoded[4 + 31], 7);
        assert_eq!(encoded[4 + 32 + 31], 0xbb);
    }
}
