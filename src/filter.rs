//! Search filter validation and matching.

use crate::proto::memory::Unit;
use crate::proto::{Filter, Laptop, Memory};
use crate::{Error, Result};

/// Converts a memory size to bits, saturating on overflow.
pub fn memory_bits(memory: &Memory) -> u64 {
    let value = memory.value;
    match memory.unit() {
        Unit::Bit => value,
        Unit::Byte => value.saturating_mul(8),
        Unit::Kilobyte => value.saturating_mul(8u64 << 10),
        Unit::Megabyte => value.saturating_mul(8u64 << 20),
        Unit::Gigabyte => value.saturating_mul(8u64 << 30),
        Unit::Terabyte => value.saturating_mul(8u64 << 40),
        Unit::Unknown => 0,
    }
}

/// Rejects filters that cannot describe any sensible bound.
pub fn validate_filter(filter: &Filter) -> Result<()> {
    if !filter.max_price_usd.is_finite() || filter.max_price_usd < 0.0 {
        return Err(Error::InvalidArgument(format!(
            "max price {} must be a non-negative number",
            filter.max_price_usd
        )));
    }

    if !filter.min_cpu_ghz.is_finite() || filter.min_cpu_ghz < 0.0 {
        return Err(Error::InvalidArgument(format!(
            "min CPU frequency {} must be a non-negative number",
            filter.min_cpu_ghz
        )));
    }

    if let Some(ram) = &filter.min_ram {
        if ram.value > 0 && ram.unit() == Unit::Unknown {
            return Err(Error::InvalidArgument(
                "min RAM has a value but no unit".to_string(),
            ));
        }
    }

    Ok(())
}

/// Returns true when `laptop` satisfies every bound of `filter`.
///
/// A zero max price means no price bound; zero minimums are trivially met.
pub fn is_qualified(filter: &Filter, laptop: &Laptop) -> bool {
    if filter.max_price_usd > 0.0 && laptop.price_usd > filter.max_price_usd {
        return false;
    }

    let (cores, ghz) = laptop
        .cpu
        .as_ref()
        .map_or((0, 0.0), |cpu| (cpu.number_cores, cpu.min_ghz));

    if cores < filter.min_cpu_cores || ghz < filter.min_cpu_ghz {
        return false;
    }

    let min_ram = filter.min_ram.as_ref().map_or(0, memory_bits);
    let ram = laptop.ram.as_ref().map_or(0, memory_bits);

    ram >= min_ram
}
