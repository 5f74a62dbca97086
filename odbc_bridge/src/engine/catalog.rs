//! Installed-driver and data-source enumeration.
//!
//! The engine hands back a counted record array; the bridge walks it,
//! copies everything into owned data, and returns the whole array through
//! the matching bulk deleter. Deletion is Drop-guarded so a record that
//! fails to decode mid-walk still returns the array exactly once.

use crate::channel::with_error_check;
use crate::codec;
use crate::error::{BridgeError, Result};
use crate::native::types::{RawDataSourceRecord, RawDriverRecord};
use crate::native::NativeEngine;
use serde::Serialize;

/// One installed driver with its configuration attributes.
#[derive(Debug, Clone, Serialize)]
pub struct DriverInfo {
    pub name: String,
    pub attributes: Vec<(String, String)>,
}

/// One configured data source.
#[derive(Debug, Clone, Serialize)]
pub struct DataSourceInfo {
    pub name: String,
    pub description: Option<String>,
    pub driver: Option<String>,
}

struct DriverArrayGuard<'e> {
    engine: &'e dyn NativeEngine,
    array: *mut RawDriverRecord,
    count: u32,
}

impl Drop for DriverArrayGuard<'_> {
    fn drop(&mut self) {
        // Safety: array and count are exactly what list_drivers returned.
        unsafe { self.engine.delete_driver_array(self.array, self.count) };
    }
}

struct DataSourceArrayGuard<'e> {
    engine: &'e dyn NativeEngine,
    array: *mut RawDataSourceRecord,
    count: u32,
}

impl Drop for DataSourceArrayGuard<'_> {
    fn drop(&mut self) {
        unsafe {
            self.engine.delete_data_source_array(self.array, self.count)
        };
    }
}

unsafe fn decode_driver(raw: &RawDriverRecord) -> Result<DriverInfo> {
    let name = codec::decode(raw.name)
        .ok_or_else(|| BridgeError::Marshal("driver record with null name".to_string()))?;
    let mut attributes = Vec::with_capacity(raw.attribute_count as usize);
    if !raw.attributes.is_null() {
        for i in 0..raw.attribute_count as usize {
            let attr = &*raw.attributes.add(i);
            let key = codec::decode(attr.key).ok_or_else(|| {
                BridgeError::Marshal(format!("driver '{}' attribute with null key", name))
            })?;
            let value = codec::decode(attr.value).unwrap_or_default();
            attributes.push((key, value));
        }
    }
    Ok(DriverInfo { name, attributes })
}

/// Enumerates the drivers installed on this machine.
pub fn list_drivers(engine: &dyn NativeEngine) -> Result<Vec<DriverInfo>> {
    let mut count: u32 = 0;
    let array = with_error_check(engine, |err| unsafe {
        engine.list_drivers(&mut count, err)
    })?;
    if array.is_null() {
        return Ok(Vec::new());
    }
    let _guard = DriverArrayGuard {
        engine,
        array,
        count,
    };
    let mut drivers = Vec::with_capacity(count as usize);
    for i in 0..count as usize {
        // Safety: the engine guarantees `count` contiguous records.
        let raw = unsafe { &*array.add(i) };
        drivers.push(unsafe { decode_driver(raw) }?);
    }
    Ok(drivers)
}

/// Enumerates the configured data sources.
pub fn list_data_sources(engine: &dyn NativeEngine) -> Result<Vec<DataSourceInfo>> {
    let mut count: u32 = 0;
    let array = with_error_check(engine, |err| unsafe {
        engine.list_data_sources(&mut count, err)
    })?;
    if array.is_null() {
        return Ok(Vec::new());
    }
    let _guard = DataSourceArrayGuard {
        engine,
        array,
        count,
    };
    let mut sources = Vec::with_capacity(count as usize);
    for i in 0..count as usize {
        let raw = unsafe { &*array.add(i) };
        let name = unsafe { codec::decode(raw.name) }
            .ok_or_else(|| BridgeError::Marshal("data source record with null name".to_string()))?;
        sources.push(DataSourceInfo {
            name,
            description: unsafe { codec::decode(raw.description) },
            driver: unsafe { codec::decode(raw.driver) },
        });
    }
    Ok(sources)
}
