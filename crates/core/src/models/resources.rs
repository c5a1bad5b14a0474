use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// 资源向量
///
/// 以资源类别名为键的数量映射，如 `{"cpu": 4.0, "memory_mb": 8192.0, "gpu": 0.5}`。
/// GPU等专用硬件允许小数量（分数卡）。所有算术操作保持非负。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceVector {
    entries: BTreeMap<String, f64>,
}

impl ResourceVector {
    pub fn new() -> Self {
        Self::default()
    }

    /// 构造器风格设置某一资源类别的数量
    pub fn with(mut self, class: &str, amount: f64) -> Self {
        self.set(class, amount);
        self
    }

    pub fn set(&mut self, class: &str, amount: f64) {
        if amount > 0.0 {
            self.entries.insert(class.to_string(), amount);
        } else {
            self.entries.remove(class);
        }
    }

    pub fn get(&self, class: &str) -> f64 {
        self.entries.get(class).copied().unwrap_or(0.0)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn classes(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(|k| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), *v))
    }

    /// 所有类别数量之和，用于公平性核算的标量化
    pub fn total_units(&self) -> f64 {
        self.entries.values().sum()
    }

    /// 每个类别都不超过another中的对应数量时为true
    pub fn fits_within(&self, other: &ResourceVector) -> bool {
        self.iter().all(|(class, amount)| amount <= other.get(class) + f64::EPSILON)
    }

    /// 任一类别超过other中的对应数量时为true
    pub fn exceeds(&self, other: &ResourceVector) -> bool {
        !self.fits_within(other)
    }

    pub fn add(&mut self, other: &ResourceVector) {
        for (class, amount) in other.iter() {
            let current = self.get(class);
            self.set(class, current + amount);
        }
    }

    /// 逐类别减去other，结果在0处饱和
    pub fn saturating_sub(&mut self, other: &ResourceVector) {
        for (class, amount) in other.iter() {
            let current = self.get(class);
            self.set(class, (current - amount).max(0.0));
        }
    }

    /// 返回 self - other 的非负差值向量
    pub fn headroom(&self, other: &ResourceVector) -> ResourceVector {
        let mut result = ResourceVector::new();
        for (class, amount) in self.iter() {
            let diff = amount - other.get(class);
            if diff > 0.0 {
                result.set(class, diff);
            }
        }
        result
    }

}

#[cfg(test)]
mod tests {
    use super::*;

    fn vec_cpu_mem(cpu: f64, mem: f64) -> ResourceVector {
        ResourceVector::new().with("cpu", cpu).with("memory_mb", mem)
    }

    #[test]
    fn test_fits_within() {
        let request = vec_cpu_mem(2.0, 1024.0);
        let capacity = vec_cpu_mem(4.0, 4096.0);
        assert!(request.fits_within(&capacity));
        assert!(!capacity.fits_within(&request));
    }

    #[test]
    fn test_fits_within_missing_class() {
        let request = ResourceVector::new().with("gpu", 0.5);
        let capacity = vec_cpu_mem(4.0, 4096.0);
        assert!(!request.fits_within(&capacity));
    }

    #[test]
    fn test_add_and_saturating_sub() {
        let mut usage = vec_cpu_mem(2.0, 1024.0);
        usage.add(&vec_cpu_mem(1.0, 512.0));
        assert_eq!(usage.get("cpu"), 3.0);
        assert_eq!(usage.get("memory_mb"), 1536.0);

        usage.saturating_sub(&vec_cpu_mem(5.0, 512.0));
        assert_eq!(usage.get("cpu"), 0.0);
        assert_eq!(usage.get("memory_mb"), 1024.0);
    }

    #[test]
    fn test_headroom() {
        let capacity = vec_cpu_mem(8.0, 4096.0);
        let allocated = vec_cpu_mem(3.0, 4096.0);
        let free = capacity.headroom(&allocated);
        assert_eq!(free.get("cpu"), 5.0);
        assert_eq!(free.get("memory_mb"), 0.0);
    }

    #[test]
    fn test_fractional_gpu() {
        let request = ResourceVector::new().with("gpu", 0.25);
        let capacity = ResourceVector::new().with("gpu", 1.0);
        assert!(request.fits_within(&capacity));
        assert_eq!(request.total_units(), 0.25);
    }
}
