#[derive(Clone, Debug, PartialEq)]
pub struct Product {
    pub id: usize,
    pub price: f64,
    pub production_cost: f64,
    pub holding_cost: f64,
    pub initial_inventory: f64,
    pub demand: Vec<f64>,
}

impl Product {
    pub fn new(
        id: usize,
        price: f64,
        production_cost: f64,
        holding_cost: f64,
        initial_inventory: f64,
        demand: Vec<f64>,
    ) -> Self {
        Self {
            id,
            price,
            production_cost,
            holding_cost,
            initial_inventory,
            demand,
        }
    }
}

/// A reusable production factor: it is stocked between periods and
/// replenished either from the uncertain secondary supply or from the
/// (more expensive) primary market.
#[derive(Clone, Debug, PartialEq)]
pub struct SecondaryFactor {
    pub id: usize,
    /// Consumption per unit of each product
    pub coefficients: Vec<f64>,
    pub initial_inventory: f64,
    pub secondary_cost: f64,
    pub primary_cost: f64,
    /// Expected availability per period
    pub availability: Vec<f64>,
}

impl SecondaryFactor {
    pub fn new(
        id: usize,
        coefficients: Vec<f64>,
        initial_inventory: f64,
        secondary_cost: f64,
        primary_cost: f64,
        availability: Vec<f64>,
    ) -> Self {
        Self {
            id,
            coefficients,
            initial_inventory,
            secondary_cost,
            primary_cost,
            availability,
        }
    }

    /// Quantity consumed by a production vector
    pub fn consumption(&self, production: &[f64]) -> f64 {
        crate::utils::dot_product(&self.coefficients, production)
    }
}

/// A factor with a fixed capacity per period
#[derive(Clone, Debug, PartialEq)]
pub struct FixedFactor {
    pub id: usize,
    pub coefficients: Vec<f64>,
    pub capacity: Vec<f64>,
}

impl FixedFactor {
    pub fn new(id: usize, coefficients: Vec<f64>, capacity: Vec<f64>) -> Self {
        Self {
            id,
            coefficients,
            capacity,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct SystemMetadata {
    pub products_count: usize,
    pub secondary_factors_count: usize,
    pub fixed_factors_count: usize,
}

#[derive(Clone, Debug, PartialEq)]
pub struct System {
    pub num_periods: usize,
    pub products: Vec<Product>,
    pub secondary_factors: Vec<SecondaryFactor>,
    pub fixed_factors: Vec<FixedFactor>,
    pub meta: SystemMetadata,
}

impl System {
    pub fn new(
        num_periods: usize,
        products: Vec<Product>,
        secondary_factors: Vec<SecondaryFactor>,
        fixed_factors: Vec<FixedFactor>,
    ) -> Self {
        let meta = SystemMetadata {
            products_count: products.len(),
            secondary_factors_count: secondary_factors.len(),
            fixed_factors_count: fixed_factors.len(),
        };
        Self {
            num_periods,
            products,
            secondary_factors,
            fixed_factors,
            meta,
        }
    }

    /// Secondary material still needed by a production plan from period
    /// `from` to the end of the horizon. `production[j][t]` is the amount
    /// of product j made in period t.
    pub fn remaining_requirement(
        &self,
        factor: usize,
        from: usize,
        production: &[Vec<f64>],
    ) -> f64 {
        let f = &self.secondary_factors[factor];
        (from..self.num_periods)
            .map(|t| {
                f.coefficients
                    .iter()
                    .zip(production.iter())
                    .map(|(a, y)| a * y[t])
                    .sum::<f64>()
            })
            .sum()
    }

    /// One product, two periods, one cheap reusable factor
    pub fn default() -> Self {
        let products = vec![Product::new(0, 10.0, 2.0, 0.0, 0.0, vec![5.0, 5.0])];
        let secondary_factors = vec![SecondaryFactor::new(
            0,
            vec![1.0],
            0.0,
            1.0,
            100.0,
            vec![5.0, 5.0],
        )];
        Self::new(2, products, secondary_factors, vec![])
    }
}

#[cfg(test)]
mod tests {

    use super::*;

    #[test]
    fn test_create_default_system() {
        let system = System::default();
        assert_eq!(system.num_periods, 2);
        assert_eq!(system.meta.products_count, 1);
        assert_eq!(system.meta.secondary_factors_count, 1);
        assert_eq!(system.meta.fixed_factors_count, 0);
    }

    #[test]
    fn test_remaining_requirement() {
        let mut system = System::default();
        system.secondary_factors[0].coefficients = vec![2.0];
        let production = vec![vec![5.0, 3.0]];
        assert_eq!(system.remaining_requirement(0, 0, &production), 16.0);
        assert_eq!(system.remaining_requirement(0, 1, &production), 6.0);
        assert_eq!(system.remaining_requirement(0, 2, &production), 0.0);
    }

    #[test]
    fn test_consumption() {
        let factor = SecondaryFactor::new(0, vec![1.0, 2.0], 0.0, 1.0, 2.0, vec![]);
        assert_eq!(factor.consumption(&[3.0, 4.0]), 11.0);
    }
}
