//! Random sample laptops for tests, demos and the client binary.

use std::time::{SystemTime, UNIX_EPOCH};

use rand::seq::SliceRandom;
use rand::Rng;
use uuid::Uuid;

use crate::proto::{
    keyboard, laptop, memory, screen, storage, Cpu, Gpu, Keyboard, Laptop, Memory, Screen, Storage,
};

fn pick<'a>(rng: &mut impl Rng, options: &[&'a str]) -> &'a str {
    options.choose(rng).copied().unwrap_or_default()
}

fn memory(value: u64, unit: memory::Unit) -> Memory {
    Memory {
        value,
        unit: unit as i32,
    }
}

/// Random keyboard.
pub fn new_keyboard() -> Keyboard {
    let mut rng = rand::thread_rng();
    let layout = match rng.gen_range(0..3) {
        0 => keyboard::Layout::Qwerty,
        1 => keyboard::Layout::Qwertz,
        _ => keyboard::Layout::Azerty,
    };

    Keyboard {
        layout: layout as i32,
        backlit: rng.gen_bool(0.5),
    }
}

/// Random CPU.
pub fn new_cpu() -> Cpu {
    let mut rng = rand::thread_rng();
    let brand = pick(&mut rng, &["Intel", "AMD"]);
    let name = if brand == "Intel" {
        pick(
            &mut rng,
            &[
                "Xeon E-2286M",
                "Core i9-9980HK",
                "Core i7-9750H",
                "Core i5-9400F",
                "Core i3-1005G1",
            ],
        )
    } else {
        pick(
            &mut rng,
            &["Ryzen 7 PRO 2700U", "Ryzen 5 PRO 3500U", "Ryzen 3 PRO 3200U"],
        )
    };

    let number_cores = rng.gen_range(2..=8);
    let number_threads = rng.gen_range(number_cores..=12);
    let min_ghz = rng.gen_range(2.0..3.5);
    let max_ghz = rng.gen_range(min_ghz..5.0);

    Cpu {
        brand: brand.to_string(),
        name: name.to_string(),
        number_cores,
        number_threads,
        min_ghz,
        max_ghz,
    }
}

/// Random GPU.
pub fn new_gpu() -> Gpu {
    let mut rng = rand::thread_rng();
    let brand = pick(&mut rng, &["NVIDIA", "AMD"]);
    let name = if brand == "NVIDIA" {
        pick(&mut rng, &["RTX 2060", "RTX 2070", "GTX 1660-Ti", "GTX 1070"])
    } else {
        pick(&mut rng, &["RX 590", "RX 580", "RX 5700-XT", "RX Vega-56"])
    };

    let min_ghz = rng.gen_range(1.0..1.5);
    let max_ghz = rng.gen_range(min_ghz..2.0);

    Gpu {
        brand: brand.to_string(),
        name: name.to_string(),
        min_ghz,
        max_ghz,
        memory: Some(memory(rng.gen_range(2..=6), memory::Unit::Gigabyte)),
    }
}

/// Random RAM size between 4 and 64 GiB.
pub fn new_ram() -> Memory {
    memory(rand::thread_rng().gen_range(4..=64), memory::Unit::Gigabyte)
}

/// Random SSD.
pub fn new_ssd() -> Storage {
    Storage {
        driver: storage::Driver::Ssd as i32,
        memory: Some(memory(
            rand::thread_rng().gen_range(128..=1024),
            memory::Unit::Gigabyte,
        )),
    }
}

/// Random HDD.
pub fn new_hdd() -> Storage {
    Storage {
        driver: storage::Driver::Hdd as i32,
        memory: Some(memory(
            rand::thread_rng().gen_range(1..=6),
            memory::Unit::Terabyte,
        )),
    }
}

/// Random 16:9 screen.
pub fn new_screen() -> Screen {
    let mut rng = rand::thread_rng();
    let height = rng.gen_range(1080..=4320);
    let panel = if rng.gen_bool(0.5) {
        screen::Panel::Ips
    } else {
        screen::Panel::Oled
    };

    Screen {
        size_inch: rng.gen_range(13.0..17.0),
        resolution: Some(screen::Resolution {
            width: height * 16 / 9,
            height,
        }),
        panel: panel as i32,
        multitouch: rng.gen_bool(0.5),
    }
}

/// Random laptop with a fresh UUID.
pub fn new_laptop() -> Laptop {
    let mut rng = rand::thread_rng();
    let brand = pick(&mut rng, &["Apple", "Dell", "Lenovo"]);
    let name = match brand {
        "Apple" => pick(&mut rng, &["Macbook Air", "Macbook Pro"]),
        "Dell" => pick(&mut rng, &["Latitude", "Vostro", "XPS", "Alienware"]),
        _ => pick(&mut rng, &["Thinkpad X1", "Thinkpad P1", "Thinkpad P53"]),
    };

    let updated_at_unix = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_secs()).unwrap_or(i64::MAX))
        .unwrap_or_default();

    Laptop {
        id: Uuid::new_v4().to_string(),
        brand: brand.to_string(),
        name: name.to_string(),
        cpu: Some(new_cpu()),
        ram: Some(new_ram()),
        gpus: vec![new_gpu()],
        storages: vec![new_ssd(), new_hdd()],
        screen: Some(new_screen()),
        keyboard: Some(new_keyboard()),
        weight: Some(laptop::Weight::WeightKg(rng.gen_range(1.0..3.0))),
        price_usd: rng.gen_range(1500.0..3500.0),
        release_year: rng.gen_range(2015..=2019),
        updated_at_unix,
    }
}
