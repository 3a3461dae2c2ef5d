// Copyright The Quill Project Authors. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use crate::crypto::secret::Secret;
use hex_literal::hex;

//= https://www.rfc-editor.org/rfc/rfc9001#section-5.2
//# initial_salt = 0x38762cf7f55934b34d179ae6a4c80cadccbb7f0a

pub const INITIAL_SALT: [u8; 20] = hex!("38762cf7f55934b34d179ae6a4c80cadccbb7f0a");

//= https://www.rfc-editor.org/rfc/rfc9001#section-5.2
//# client_initial_secret = HKDF-Expand-Label(initial_secret,
//#                                           "client in", "",
//#                                           Hash.length)

pub const INITIAL_CLIENT_LABEL: [u8; 9] = *b"client in";

//= https://www.rfc-editor.org/rfc/rfc9001#section-5.2
//# server_initial_secret = HKDF-Expand-Label(initial_secret,
//#                                           "server in", "",
//#                                           Hash.length)

pub const INITIAL_SERVER_LABEL: [u8; 9] = *b"server in";

/// The per-direction traffic secrets for the Initial encryption level.
///
/// Both directions derive from the client's first Destination Connection ID
/// alone, which is why any on-path observer can compute them; they provide
/// no confidentiality, only protocol ossification resistance.
#[derive(Debug)]
pub struct InitialSecrets {
    pub client: Secret,
    pub server: Secret,
}

impl InitialSecrets {
    #[inline]
    pub fn new(odcid: &[u8]) -> Self {
        let initial_secret = Secret::extract(&INITIAL_SALT, odcid);

        Self {
            client: initial_secret.expand_label(&INITIAL_CLIENT_LABEL, &[]),
            server: initial_secret.expand_label(&INITIAL_SERVER_LABEL, &[]),
        }
    }
}

//= https://www.rfc-editor.org/rfc/rfc9001#appendix-A.1
//# These packets use an 8-byte client-chosen Destination Connection ID
//# of 0x8394c8f03e515708.

pub const EXAMPLE_DCID: [u8; 8] = hex!("8394c8f03e515708");

//= https://www.rfc-editor.org/rfc/rfc9001#appendix-A.1
//# client_initial_secret
//#     = HKDF-Expand-Label(initial_secret, "client in", "", 32)
//#     = c00cf151ca5be075ed0ebfb5c80323c4
//#       2d6b7db67881289af4008f1f6c357aea

pub const EXAMPLE_CLIENT_INITIAL_SECRET: [u8; 32] = hex!(
    "
    c00cf151ca5be075ed0ebfb5c80323c4
    2d6b7db67881289af4008f1f6c357aea
    "
);

//= https://www.rfc-editor.org/rfc/rfc9001#appendix-A.1
//# server_initial_secret
//#     = HKDF-Expand-Label(initial_secret, "server in", "", 32)
//#     = 3c199828fd139efd216c155ad844cc81
//#       fb82fa8d7446fa7d78be803acdda951b

pub const EXAMPLE_SERVER_INITIAL_SECRET: [u8; 32] = hex!(
    "
    3c199828fd139efd216c155ad844cc81
    fb82fa8d7446fa7d78be803acdda951b
    "
);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::packet_protection::{QUIC_HP_LABEL, QUIC_IV_LABEL, QUIC_KEY_LABEL};

    #[test]
    fn example_secrets_test() {
        let secrets = InitialSecrets::new(&EXAMPLE_DCID);
        assert_eq!(secrets.client.as_bytes(), &EXAMPLE_CLIENT_INITIAL_SECRET);
        assert_eq!(secrets.server.as_bytes(), &EXAMPLE_SERVER_INITIAL_SECRET);
    }

    //= https://www.rfc-editor.org/rfc/rfc9001#appendix-A.1
    //= type=test
    //# key = HKDF-Expand-Label(client_initial_secret, "quic key", "", 16)
    //#     = 1f369613dd76d5467730efcbe3b1a22d
    //# iv  = HKDF-Expand-Label(client_initial_secret, "quic iv", "", 12)
    //#     = fa044b2f42a3fd3b46fb255c
    //# hp  = HKDF-Expand-Label(client_initial_secret, "quic hp", "", 16)
    //#     = 9f50449e04a0e810283a1e9933adedd2
    #[test]
    fn example_client_key_material_test() {
        let secrets = InitialSecrets::new(&EXAMPLE_DCID);

        let mut key = [0u8; 16];
        secrets.client.expand_label_into(&QUIC_KEY_LABEL, &[], &mut key);
        assert_eq!(key, hex!("1f369613dd76d5467730efcbe3b1a22d"));

        let mut iv = [0u8; 12];
        secrets.client.expand_label_into(&QUIC_IV_LABEL, &[], &mut iv);
        assert_eq!(iv, hex!("fa044b2f42a3fd3b46fb255c"));

        let mut hp = [0u8; 16];
        secrets.client.expand_label_into(&QUIC_HP_LABEL, &[], &mut hp);
        assert_eq!(hp, hex!("9f50449e04a0e810283a1e9933adedd2"));
    }

    //= https://www.rfc-editor.org/rfc/rfc9001#appendix-A.1
    //= type=test
    //# key = HKDF-Expand-Label(server_initial_secret, "quic key", "", 16)
    //#     = cf3a5331653c364c88f0f379b6067e37
    //# iv  = HKDF-Expand-Label(server_initial_secret, "quic iv", "", 12)
    //#     = 0ac1493ca1905853b0bba03e
    //# hp  = HKDF-Expand-Label(server_initial_secret, "quic hp", "", 16)
    //#     = c206b8d9b9f0f37644430b490eeaa314
    #[test]
    fn example_server_key_material_test() {
        let secrets = InitialSecrets::new(&EXAMPLE_DCID);

        let mut key = [0u8; 16];
        secrets.server.expand_label_into(&QUIC_KEY_LABEL, &[], &mut key);
        assert_eq!(key, hex!("cf3a5331653c364c88f0f379b6067e37"));

        let mut iv = [0u8; 12];
        secrets.server.expand_label_into(&QUIC_IV_LABEL, &[], &mut iv);
        assert_eq!(iv, hex!("0ac1493ca1905853b0bba03e"));

        let mut hp = [0u8; 16];
        secrets.server.expand_label_into(&QUIC_HP_LABEL, &[], &mut hp);
        assert_eq!(hp, hex!("c206b8d9b9f0f37644430b490eeaa314"));
    }
}
