use std::time::{Duration, SystemTime, UNIX_EPOCH};

use laptop_catalog::auth::{Role, TokenError, TokenManager};
use laptop_catalog::filter::{is_qualified, memory_bits};
use laptop_catalog::proto::memory::Unit;
use laptop_catalog::proto::{Cpu, Filter, Laptop, Memory};
use laptop_catalog::store::LaptopStore;
use laptop_catalog::{sample, Error};
use proptest::prelude::*;

fn role() -> impl Strategy<Value = Role> {
    prop_oneof![Just(Role::Admin), Just(Role::User)]
}

fn unit() -> impl Strategy<Value = Unit> {
    prop_oneof![
        Just(Unit::Bit),
        Just(Unit::Byte),
        Just(Unit::Kilobyte),
        Just(Unit::Megabyte),
        Just(Unit::Gigabyte),
        Just(Unit::Terabyte),
    ]
}

fn at(secs: u64) -> SystemTime {
    UNIX_EPOCH + Duration::from_secs(secs)
}

proptest! {
    #[test]
    fn issued_token_verifies_with_same_claims(
        subject in "[a-z][a-z0-9_]{0,31}",
        role in role(),
        ttl in 1u64..86_400,
        issued in 1_000_000_000u64..2_000_000_000,
    ) {
        let tokens = TokenManager::new("secret", Duration::from_secs(ttl));
        let token = tokens
            .issue_at(&subject, role, Duration::from_secs(ttl), at(issued))
            .unwrap();

        let claims = tokens.verify_at(&token, at(issued)).unwrap();
        prop_assert_eq!(claims.sub, subject);
        prop_assert_eq!(claims.role, role);
        prop_assert_eq!(claims.exp, issued + ttl);
    }

    #[test]
    fn token_past_expiry_is_always_expired(
        role in role(),
        ttl in 1u64..3_600,
        late_by in 0u64..1_000_000,
        foreign_key in any::<bool>(),
    ) {
        let issued = 1_700_000_000;
        let verifier = TokenManager::new("secret", Duration::from_secs(ttl));
        let issuer = if foreign_key {
            TokenManager::new("someone-else", Duration::from_secs(ttl))
        } else {
            TokenManager::new("secret", Duration::from_secs(ttl))
        };

        let token = issuer
            .issue_at("admin1", role, Duration::from_secs(ttl), at(issued))
            .unwrap();

        prop_assert_eq!(
            verifier.verify_at(&token, at(issued + ttl + late_by)),
            Err(TokenError::Expired)
        );
    }

    #[test]
    fn non_uuid_ids_are_rejected(id in "[a-zA-Z0-9-]{0,40}") {
        prop_assume!(uuid::Uuid::parse_str(&id).is_err());

        let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
        runtime.block_on(async {
            let store = LaptopStore::new();
            let mut laptop = sample::new_laptop();
            laptop.id = id.clone();

            let saved = store.save(laptop).await;
            prop_assert!(matches!(saved, Err(Error::InvalidArgument(_))));
            prop_assert!(matches!(store.find(&id).await, Err(Error::NotFound(_))));
            Ok(())
        })?;
    }

    #[test]
    fn memory_comparison_is_unit_independent(value in 0u64..1_000_000, unit in unit()) {
        let larger = Memory { value: value + 1, unit: unit as i32 };
        let smaller = Memory { value, unit: unit as i32 };
        prop_assert!(memory_bits(&larger) > memory_bits(&smaller));
    }

    #[test]
    fn raising_a_minimum_never_adds_matches(
        price in 100.0f64..5_000.0,
        cores in 1u32..16,
        ghz in 1.0f64..5.0,
        ram_gb in 1u64..128,
        min_cores in 0u32..16,
        extra in 1u32..8,
    ) {
        let laptop = Laptop {
            price_usd: price,
            cpu: Some(Cpu { number_cores: cores, min_ghz: ghz, ..Cpu::default() }),
            ram: Some(Memory { value: ram_gb, unit: Unit::Gigabyte as i32 }),
            ..Laptop::default()
        };

        let loose = Filter { min_cpu_cores: min_cores, ..Filter::default() };
        let strict = Filter { min_cpu_cores: min_cores + extra, ..Filter::default() };

        if is_qualified(&strict, &laptop) {
            prop_assert!(is_qualified(&loose, &laptop));
        }
    }
}
